//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 내부 메트릭 접두어: `wasmward_` + 서브시스템(`engine_`, `pipeline_`, `sink_`)
//! - 접미어: `_total` (counter), 없음 (gauge)
//! - `wasm_threat_detector_*` 두 개는 외부 인터페이스로 고정된 노출 이름입니다
//!   (메트릭 싱크가 기록하며, 이름을 바꾸면 안 됩니다)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 규칙명 레이블 키
pub const LABEL_RULE: &str = "rule";

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 수집기명 레이블 키
pub const LABEL_COLLECTOR: &str = "collector";

/// 싱크명 레이블 키
pub const LABEL_SINK: &str = "sink";

// ─── Engine 메트릭 ──────────────────────────────────────────────────

/// Engine: 현재 로드된 규칙 수 (gauge)
pub const ENGINE_RULES_LOADED: &str = "wasmward_engine_rules_loaded";

/// Engine: 규칙 호출 실패 수 (counter, label: rule)
pub const ENGINE_RULE_FAILURES_TOTAL: &str = "wasmward_engine_rule_failures_total";

// ─── Pipeline 메트릭 ────────────────────────────────────────────────

/// Pipeline: 수집된 전체 이벤트 수 (counter, label: collector)
pub const PIPELINE_EVENTS_COLLECTED_TOTAL: &str = "wasmward_pipeline_events_collected_total";

/// Pipeline: 큐 포화로 드롭된 이벤트 수 (counter, label: collector)
pub const PIPELINE_EVENTS_DROPPED_TOTAL: &str = "wasmward_pipeline_events_dropped_total";

/// Pipeline: 탐지 단계가 처리한 이벤트 수 (counter)
pub const PIPELINE_EVENTS_PROCESSED_TOTAL: &str = "wasmward_pipeline_events_processed_total";

// ─── Sink 메트릭 ────────────────────────────────────────────────────

/// Sink: 웹훅 플러시 성공 수 (counter)
pub const SINK_WEBHOOK_FLUSHES_TOTAL: &str = "wasmward_sink_webhook_flushes_total";

/// Sink: 웹훅 플러시 실패 수 (counter)
pub const SINK_WEBHOOK_FLUSH_FAILURES_TOTAL: &str =
    "wasmward_sink_webhook_flush_failures_total";

/// Sink: 싱크 처리 실패 수 (counter, label: sink)
pub const SINK_ERRORS_TOTAL: &str = "wasmward_sink_errors_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "wasmward_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "wasmward_daemon_build_info";

// ─── 외부 노출 이름 (메트릭 싱크) ───────────────────────────────────

/// 전체 탐지 위협 수 (counter) — 외부 인터페이스로 고정된 이름
pub const THREATS_TOTAL: &str = "wasm_threat_detector_total_threats";

/// 규칙/심각도별 탐지 위협 수 (counter, labels: rule, severity) — 외부 인터페이스
pub const THREATS_BY_RULE: &str = "wasm_threat_detector_threats";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `wasmward-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_gauge!(
        ENGINE_RULES_LOADED,
        "Number of rule modules currently loaded in the registry"
    );
    describe_counter!(
        ENGINE_RULE_FAILURES_TOTAL,
        "Total number of per-rule invocation failures (ABI mismatch, trap, memory)"
    );

    describe_counter!(
        PIPELINE_EVENTS_COLLECTED_TOTAL,
        "Total number of events received from collectors"
    );
    describe_counter!(
        PIPELINE_EVENTS_DROPPED_TOTAL,
        "Total number of events dropped because the fan-in queue was full"
    );
    describe_counter!(
        PIPELINE_EVENTS_PROCESSED_TOTAL,
        "Total number of events run through the detection stage"
    );

    describe_counter!(
        SINK_WEBHOOK_FLUSHES_TOTAL,
        "Total number of successful webhook batch flushes"
    );
    describe_counter!(
        SINK_WEBHOOK_FLUSH_FAILURES_TOTAL,
        "Total number of failed webhook batch flushes (batch retained)"
    );
    describe_counter!(SINK_ERRORS_TOTAL, "Total number of sink handler failures");

    describe_gauge!(DAEMON_UPTIME_SECONDS, "wasmward daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );

    describe_counter!(THREATS_TOTAL, "Total number of threats detected");
    describe_counter!(
        THREATS_BY_RULE,
        "Threats detected per rule and severity level"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERNAL_METRIC_NAMES: &[&str] = &[
        ENGINE_RULES_LOADED,
        ENGINE_RULE_FAILURES_TOTAL,
        PIPELINE_EVENTS_COLLECTED_TOTAL,
        PIPELINE_EVENTS_DROPPED_TOTAL,
        PIPELINE_EVENTS_PROCESSED_TOTAL,
        SINK_WEBHOOK_FLUSHES_TOTAL,
        SINK_WEBHOOK_FLUSH_FAILURES_TOTAL,
        SINK_ERRORS_TOTAL,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn internal_metrics_use_wasmward_prefix() {
        for name in INTERNAL_METRIC_NAMES {
            assert!(
                name.starts_with("wasmward_"),
                "metric '{name}' does not start with 'wasmward_' prefix"
            );
        }
    }

    #[test]
    fn exposition_names_are_fixed() {
        // 외부 인터페이스로 고정된 이름 — 변경 금지
        assert_eq!(THREATS_TOTAL, "wasm_threat_detector_total_threats");
        assert_eq!(THREATS_BY_RULE, "wasm_threat_detector_threats");
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더가 설치되지 않아도 패닉하지 않아야 함
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_RULE, LABEL_SEVERITY, LABEL_COLLECTOR, LABEL_SINK] {
            assert_eq!(label.to_lowercase(), *label);
        }
    }
}
