//! 규칙 엔진 통합 테스트 — 탐지 시나리오와 격리 규율
//!
//! 테스트 규칙은 WAT 텍스트로 작성되어 wasmtime이 로드 시점에
//! 컴파일합니다. 별도의 픽스처 빌드 단계가 필요 없습니다.

use std::io::Write;
use std::path::{Path, PathBuf};

use wasmward_core::error::EngineError;
use wasmward_core::event::{AttrMap, AttrValue, Event, EventKind, EventPayload, ProcessPayload};
use wasmward_core::types::{ProcessInfo, Severity};
use wasmward_engine::RuleRegistry;

/// 항상 지정된 위협 레벨을 반환하는 규칙
fn level_rule(level: i32) -> String {
    format!(
        r#"(module
  (memory (export "memory") 1)
  (func (export "detect") (param i32 i32) (result i32)
    i32.const {level}))"#
    )
}

/// 실행 즉시 트랩하는 규칙
const TRAP_RULE: &str = r#"(module
  (memory (export "memory") 1)
  (func (export "detect") (param i32 i32) (result i32)
    unreachable))"#;

/// 메모리 export가 없는 규칙
const NO_MEMORY_RULE: &str = r#"(module
  (func (export "detect") (param i32 i32) (result i32)
    i32.const 1))"#;

/// detect export가 없는 규칙
const NO_DETECT_RULE: &str = r#"(module
  (memory (export "memory") 1))"#;

/// detect 시그니처가 잘못된 규칙
const BAD_SIGNATURE_RULE: &str = r#"(module
  (memory (export "memory") 1)
  (func (export "detect") (param i32) (result i32)
    i32.const 1))"#;

/// 최대 1페이지(64KiB)로 고정된 메모리를 가진 규칙
const ONE_PAGE_RULE: &str = r#"(module
  (memory (export "memory") 1 1)
  (func (export "detect") (param i32 i32) (result i32)
    i32.const 1))"#;

/// 기록된 이벤트의 첫 바이트를 위협 레벨로 반환하는 규칙
///
/// JSON 이벤트는 항상 `{`(0x7B = 123)로 시작하므로, 호스트가 실제로
/// 오프셋에 데이터를 기록했다면 레벨 123(critical)이 나와야 합니다.
const ECHO_FIRST_BYTE_RULE: &str = r#"(module
  (memory (export "memory") 1)
  (func (export "detect") (param i32 i32) (result i32)
    local.get 0
    i32.load8_u))"#;

fn write_rule(dir: &Path, name: &str, wat: &str) -> PathBuf {
    let path = dir.join(format!("{name}.wasm"));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(wat.as_bytes()).unwrap();
    path
}

fn process_event() -> Event {
    Event {
        id: "e1".to_owned(),
        kind: EventKind::Process,
        timestamp: chrono::Utc::now(),
        source: "x".to_owned(),
        data: EventPayload::Process(ProcessPayload {
            action: Some("create".to_owned()),
            process: ProcessInfo {
                pid: 100,
                ppid: 1,
                name: "bash".to_owned(),
                executable: "/bin/bash".to_owned(),
                command_line: "bash -i".to_owned(),
                user: "0".to_owned(),
                group: "0".to_owned(),
            },
            extra: AttrMap::new(),
        }),
    }
}

#[test]
fn clean_detection_low_severity() {
    let dir = tempfile::tempdir().unwrap();
    write_rule(dir.path(), "rk_low", &level_rule(2));

    let registry = RuleRegistry::new();
    registry.load_rules_from_dir(dir.path()).unwrap();

    let results = registry.detect_event(&process_event()).unwrap();
    assert_eq!(results.len(), 1);

    let result = &results[0];
    assert_eq!(result.rule_name, "rk_low");
    assert_eq!(result.severity, Severity::Low);
    assert!(result.threat);
    assert!((result.confidence - 0.2).abs() < f64::EPSILON);
    assert_eq!(result.event.id, "e1");
    assert_eq!(result.description, "Threat detected by rule rk_low");
}

#[test]
fn critical_detection() {
    let dir = tempfile::tempdir().unwrap();
    write_rule(dir.path(), "rk_crit", &level_rule(9));

    let registry = RuleRegistry::new();
    registry.load_rules_from_dir(dir.path()).unwrap();

    let results = registry.detect_event(&process_event()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].severity, Severity::Critical);
    assert!((results[0].confidence - 0.9).abs() < f64::EPSILON);
}

#[test]
fn zero_level_produces_no_result() {
    let dir = tempfile::tempdir().unwrap();
    write_rule(dir.path(), "rk_silent", &level_rule(0));

    let registry = RuleRegistry::new();
    registry.load_rules_from_dir(dir.path()).unwrap();

    let results = registry.detect_event(&process_event()).unwrap();
    assert!(results.is_empty());
}

#[test]
fn severity_boundaries_across_levels() {
    let dir = tempfile::tempdir().unwrap();
    let registry = RuleRegistry::new();

    for (level, expected) in [
        (1, Severity::Low),
        (3, Severity::Low),
        (4, Severity::Medium),
        (5, Severity::Medium),
        (6, Severity::High),
        (7, Severity::High),
        (8, Severity::Critical),
    ] {
        let path = write_rule(dir.path(), &format!("lvl{level}"), &level_rule(level));
        registry.load_rule(format!("lvl{level}"), &path).unwrap();

        let result = registry
            .invoke_rule(&format!("lvl{level}"), &process_event())
            .unwrap()
            .unwrap();
        assert_eq!(result.severity, expected, "level {level}");
    }
}

#[test]
fn trapping_rule_does_not_block_healthy_rule() {
    let dir = tempfile::tempdir().unwrap();
    write_rule(dir.path(), "t_trap", TRAP_RULE);
    write_rule(dir.path(), "t_ok", &level_rule(5));

    let registry = RuleRegistry::new();
    registry.load_rules_from_dir(dir.path()).unwrap();
    assert_eq!(registry.loaded_rules().unwrap().len(), 2);

    let results = registry.detect_event(&process_event()).unwrap();
    assert_eq!(results.len(), 1, "only the healthy rule should produce a result");
    assert_eq!(results[0].rule_name, "t_ok");
    assert_eq!(results[0].severity, Severity::Medium);
}

#[test]
fn trap_error_surfaces_through_invoke_rule() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rule(dir.path(), "t_trap", TRAP_RULE);

    let registry = RuleRegistry::new();
    registry.load_rule("t_trap", &path).unwrap();

    let err = registry
        .invoke_rule("t_trap", &process_event())
        .unwrap_err();
    assert!(matches!(err, EngineError::Trap { .. }), "got {err}");
}

#[test]
fn missing_memory_export_is_abi_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rule(dir.path(), "no_mem", NO_MEMORY_RULE);

    let registry = RuleRegistry::new();
    registry.load_rule("no_mem", &path).unwrap();

    let err = registry.invoke_rule("no_mem", &process_event()).unwrap_err();
    assert!(matches!(err, EngineError::AbiMismatch { .. }), "got {err}");
    assert!(err.to_string().contains("memory"));
}

#[test]
fn missing_detect_export_is_abi_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rule(dir.path(), "no_detect", NO_DETECT_RULE);

    let registry = RuleRegistry::new();
    registry.load_rule("no_detect", &path).unwrap();

    let err = registry
        .invoke_rule("no_detect", &process_event())
        .unwrap_err();
    assert!(matches!(err, EngineError::AbiMismatch { .. }), "got {err}");
}

#[test]
fn wrong_detect_signature_is_abi_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rule(dir.path(), "bad_sig", BAD_SIGNATURE_RULE);

    let registry = RuleRegistry::new();
    registry.load_rule("bad_sig", &path).unwrap();

    let err = registry.invoke_rule("bad_sig", &process_event()).unwrap_err();
    assert!(matches!(err, EngineError::AbiMismatch { .. }), "got {err}");
}

#[test]
fn oversized_event_is_insufficient_memory() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rule(dir.path(), "one_page", ONE_PAGE_RULE);

    let registry = RuleRegistry::new();
    registry.load_rule("one_page", &path).unwrap();

    // 1페이지(65536바이트) 메모리에 offset 1024 + 70000바이트는 들어가지 않음
    let mut bag = AttrMap::new();
    bag.insert(
        "blob".to_owned(),
        AttrValue::Text("x".repeat(70_000)),
    );
    let event = Event::new(EventKind::Process, "x", EventPayload::Generic(bag));

    let err = registry.invoke_rule("one_page", &event).unwrap_err();
    match err {
        EngineError::InsufficientMemory {
            needed, available, ..
        } => {
            assert!(needed > available);
            assert_eq!(available, 65_536);
        }
        other => panic!("expected InsufficientMemory, got {other}"),
    }
}

#[test]
fn host_writes_event_at_fixed_offset() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rule(dir.path(), "echo", ECHO_FIRST_BYTE_RULE);

    let registry = RuleRegistry::new();
    registry.load_rule("echo", &path).unwrap();

    // JSON은 '{'(123)로 시작 → 레벨 123 → critical, 신뢰도 1.0으로 클램프
    let result = registry
        .invoke_rule("echo", &process_event())
        .unwrap()
        .unwrap();
    assert_eq!(result.severity, Severity::Critical);
    assert!((result.confidence - 1.0).abs() < f64::EPSILON);
}

#[test]
fn invoke_rule_unknown_name_fails() {
    let registry = RuleRegistry::new();
    let err = registry
        .invoke_rule("missing", &process_event())
        .unwrap_err();
    assert!(matches!(err, EngineError::RuleNotFound { .. }));
}

#[test]
fn detect_event_on_closed_registry_fails() {
    let registry = RuleRegistry::new();
    registry.close().unwrap();
    let err = registry.detect_event(&process_event()).unwrap_err();
    assert!(matches!(err, EngineError::Closed));
}

#[test]
fn rule_state_does_not_leak_between_invocations() {
    // 전역 카운터를 증가시키고 그 값을 레벨로 반환하는 규칙.
    // 호출마다 새 스토어로 인스턴스화되므로 레벨은 항상 1이어야 합니다.
    const COUNTER_RULE: &str = r#"(module
  (memory (export "memory") 1)
  (global $count (mut i32) (i32.const 0))
  (func (export "detect") (param i32 i32) (result i32)
    global.get $count
    i32.const 1
    i32.add
    global.set $count
    global.get $count))"#;

    let dir = tempfile::tempdir().unwrap();
    let path = write_rule(dir.path(), "counter", COUNTER_RULE);

    let registry = RuleRegistry::new();
    registry.load_rule("counter", &path).unwrap();

    let event = process_event();
    for _ in 0..3 {
        let result = registry.invoke_rule("counter", &event).unwrap().unwrap();
        assert_eq!(result.severity, Severity::Low);
        assert!((result.confidence - 0.1).abs() < f64::EPSILON);
    }
}
