//! 메트릭 싱크 — 규칙/심각도별 탐지 카운터
//!
//! 탐지 결과마다 `(규칙명, 심각도)` 구조화 키와 전체 카운터를 증가시키고,
//! 같은 증가를 `metrics` 파사드에도 기록하여 Prometheus 엔드포인트에
//! 노출합니다. [`render`](MetricsSink::render)는 텍스트 노출 형식의
//! 스냅샷을 생성합니다.
//!
//! 키는 구조화 튜플로 저장됩니다 — 규칙명에 `_`가 들어 있어도 노출
//! 시점에 규칙/심각도가 갈라지지 않습니다.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use wasmward_core::error::WasmwardError;
use wasmward_core::event::DetectionResult;
use wasmward_core::metrics as m;
use wasmward_core::sink::Sink;
use wasmward_core::types::Severity;

/// 메트릭 싱크
#[derive(Default)]
pub struct MetricsSink {
    counters: Mutex<BTreeMap<(String, Severity), u64>>,
    total: AtomicU64,
}

impl MetricsSink {
    /// 새 메트릭 싱크를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, Severity), u64>> {
        match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 지금까지 탐지된 전체 위협 수를 반환합니다.
    pub fn total_threats(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// 특정 규칙/심각도 조합의 카운터 값을 반환합니다.
    pub fn count_for(&self, rule: &str, severity: Severity) -> u64 {
        self.counters()
            .get(&(rule.to_owned(), severity))
            .copied()
            .unwrap_or(0)
    }

    /// 텍스트 노출 형식의 스냅샷을 생성합니다.
    ///
    /// ```text
    /// wasm_threat_detector_total_threats 3
    /// wasm_threat_detector_threats{rule="shellwatch",severity="high"} 2
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {}\n",
            m::THREATS_TOTAL,
            self.total.load(Ordering::Relaxed)
        ));
        for ((rule, severity), count) in self.counters().iter() {
            out.push_str(&format!(
                "{}{{rule=\"{}\",severity=\"{}\"}} {}\n",
                m::THREATS_BY_RULE,
                rule,
                severity,
                count
            ));
        }
        out
    }
}

impl Sink for MetricsSink {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn handle(&self, result: &DetectionResult) -> Result<(), WasmwardError> {
        {
            let mut counters = self.counters();
            *counters
                .entry((result.rule_name.clone(), result.severity))
                .or_insert(0) += 1;
        }
        self.total.fetch_add(1, Ordering::Relaxed);

        // Prometheus 엔드포인트에도 동일한 증가를 기록
        metrics::counter!(
            m::THREATS_BY_RULE,
            m::LABEL_RULE => result.rule_name.clone(),
            m::LABEL_SEVERITY => result.severity.as_str()
        )
        .increment(1);
        metrics::counter!(m::THREATS_TOTAL).increment(1);

        tracing::debug!(
            rule = %result.rule_name,
            severity = %result.severity,
            "updated threat counters"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), WasmwardError> {
        Ok(())
    }
}
