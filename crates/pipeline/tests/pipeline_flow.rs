//! 파이프라인 통합 테스트 — 수집기에서 싱크까지의 전체 흐름
//!
//! mock 수집기와 WAT 규칙으로 팬인 → 탐지 → 팬아웃 경로를 검증합니다.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wasmward_core::collector::{Collector, CollectorStatus};
use wasmward_core::config::PipelineConfig;
use wasmward_core::error::WasmwardError;
use wasmward_core::event::{AttrMap, DetectionResult, Event, EventKind, EventPayload};
use wasmward_core::sink::{DynSink, Sink};
use wasmward_core::types::Severity;
use wasmward_engine::RuleRegistry;
use wasmward_pipeline::EventPipelineBuilder;
use wasmward_sinks::{MetricsSink, MultiSink};

/// 미리 준비한 이벤트를 시작 직후 발행하는 mock 수집기
struct SeededCollector {
    events: Vec<Event>,
    tx: Option<mpsc::Sender<Event>>,
    rx: Option<mpsc::Receiver<Event>>,
    status: CollectorStatus,
}

impl SeededCollector {
    fn new(events: Vec<Event>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            events,
            tx: Some(tx),
            rx: Some(rx),
            status: CollectorStatus::Idle,
        }
    }
}

impl Collector for SeededCollector {
    fn name(&self) -> &str {
        "seeded"
    }

    fn start(&mut self, cancel: CancellationToken) -> Result<(), WasmwardError> {
        let tx = self.tx.take().expect("collector already started");
        let events = std::mem::take(&mut self.events);
        self.status = CollectorStatus::Running;
        tokio::spawn(async move {
            for event in events {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), WasmwardError> {
        self.status = CollectorStatus::Stopped;
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<Event>> {
        self.rx.take()
    }

    fn status(&self) -> CollectorStatus {
        self.status.clone()
    }
}

/// 받은 결과를 기록하는 싱크
#[derive(Default)]
struct CaptureSink {
    results: Mutex<Vec<DetectionResult>>,
}

impl CaptureSink {
    fn results(&self) -> Vec<DetectionResult> {
        self.results.lock().unwrap().clone()
    }
}

impl Sink for CaptureSink {
    fn name(&self) -> &str {
        "capture"
    }

    async fn handle(&self, result: &DetectionResult) -> Result<(), WasmwardError> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), WasmwardError> {
        Ok(())
    }
}

/// handle마다 지연을 넣어 탐지 단계를 느리게 만드는 싱크
struct SlowSink {
    delay: Duration,
}

impl Sink for SlowSink {
    fn name(&self) -> &str {
        "slow"
    }

    async fn handle(&self, _result: &DetectionResult) -> Result<(), WasmwardError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), WasmwardError> {
        Ok(())
    }
}

fn registry_with_level_rule(name: &str, level: i32) -> Arc<RuleRegistry> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("{name}.wasm"));
    let wat = format!(
        r#"(module
  (memory (export "memory") 1)
  (func (export "detect") (param i32 i32) (result i32)
    i32.const {level}))"#
    );
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(wat.as_bytes()).unwrap();

    let registry = RuleRegistry::new();
    registry.load_rule(name, &path).unwrap();
    Arc::new(registry)
}

fn generic_event() -> Event {
    Event::new(
        EventKind::Process,
        "seeded",
        EventPayload::Generic(AttrMap::new()),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

#[tokio::test]
async fn events_flow_from_collector_to_sinks() {
    let registry = registry_with_level_rule("flowcheck", 6);

    let capture = Arc::new(CaptureSink::default());
    let metrics_sink = Arc::new(MetricsSink::new());
    let mut multi = MultiSink::new();
    multi.register(Box::new(Arc::clone(&capture)) as Box<dyn DynSink>);
    multi.register(Box::new(Arc::clone(&metrics_sink)) as Box<dyn DynSink>);

    let events: Vec<Event> = (0..3).map(|_| generic_event()).collect();
    let mut pipeline = EventPipelineBuilder::new()
        .registry(registry)
        .sinks(Arc::new(multi))
        .collector(Box::new(SeededCollector::new(events, 16)))
        .build()
        .unwrap();

    pipeline.start().unwrap();

    assert!(
        wait_until(|| capture.results().len() == 3, Duration::from_secs(10)).await,
        "expected 3 detection results, got {}",
        capture.results().len()
    );

    pipeline.stop().await.unwrap();

    let results = capture.results();
    assert!(results.iter().all(|r| r.rule_name == "flowcheck"));
    assert!(results.iter().all(|r| r.severity == Severity::High));
    assert!(results.iter().all(|r| r.threat));

    // 메트릭 싱크에도 동일한 결과가 집계됨
    assert_eq!(metrics_sink.total_threats(), 3);
    assert_eq!(metrics_sink.count_for("flowcheck", Severity::High), 3);

    assert_eq!(pipeline.processed_count(), 3);
    assert_eq!(pipeline.detection_count(), 3);
    assert_eq!(pipeline.dropped_count(), 0);
}

#[tokio::test]
async fn queue_overflow_drops_events_without_deadlock() {
    let registry = registry_with_level_rule("overflow", 5);

    // 느린 싱크로 탐지 단계를 정체시켜 팬인 큐를 포화시킴
    let mut multi = MultiSink::new();
    multi.register(Box::new(SlowSink {
        delay: Duration::from_millis(300),
    }) as Box<dyn DynSink>);

    let events: Vec<Event> = (0..30).map(|_| generic_event()).collect();
    let config = PipelineConfig {
        queue_capacity: 4,
        shutdown_grace_secs: 2,
        ..Default::default()
    };
    let mut pipeline = EventPipelineBuilder::new()
        .config(config)
        .registry(registry)
        .sinks(Arc::new(multi))
        .collector(Box::new(SeededCollector::new(events, 64)))
        .build()
        .unwrap();

    pipeline.start().unwrap();

    // 용량 4 큐에 30개가 밀려들어오므로 상당수가 드롭되어야 함
    assert!(
        wait_until(|| pipeline.dropped_count() >= 6, Duration::from_secs(10)).await,
        "expected at least 6 drops, got {}",
        pipeline.dropped_count()
    );

    // 드롭이 발생해도 파이프라인은 살아 있고 정상적으로 정지됨
    let health = pipeline.health_check();
    assert!(matches!(
        health,
        wasmward_pipeline::HealthStatus::Degraded(_)
    ));

    tokio::time::timeout(Duration::from_secs(10), pipeline.stop())
        .await
        .expect("stop must not deadlock")
        .unwrap();
}

#[tokio::test]
async fn multiple_collectors_fan_in() {
    let registry = registry_with_level_rule("fanin", 2);

    let capture = Arc::new(CaptureSink::default());
    let mut multi = MultiSink::new();
    multi.register(Box::new(Arc::clone(&capture)) as Box<dyn DynSink>);

    let first: Vec<Event> = (0..2).map(|_| generic_event()).collect();
    let second: Vec<Event> = (0..3).map(|_| generic_event()).collect();

    let mut pipeline = EventPipelineBuilder::new()
        .registry(registry)
        .sinks(Arc::new(multi))
        .collector(Box::new(SeededCollector::new(first, 16)))
        .collector(Box::new(SeededCollector::new(second, 16)))
        .build()
        .unwrap();

    pipeline.start().unwrap();
    assert!(
        wait_until(|| capture.results().len() == 5, Duration::from_secs(10)).await,
        "expected 5 results from two collectors"
    );
    pipeline.stop().await.unwrap();
}
