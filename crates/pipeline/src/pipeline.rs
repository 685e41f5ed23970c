//! 파이프라인 오케스트레이션 — 수집/팬인/탐지/팬아웃의 전체 흐름을 관리합니다.
//!
//! [`EventPipeline`]은 수집기들을 시작하고, 수집기별 팬인 태스크와 단일
//! 탐지 태스크를 스폰하며, 종료 시 cancellation token을 전파합니다.
//!
//! # 종료 순서
//!
//! 1. cancellation token 발동 — 수집기가 발행을 멈춤
//! 2. 팬인 태스크는 이미 수신한 이벤트를 전달한 뒤 종료
//! 3. 탐지 태스크는 드레인 없이 다음 큐 읽기에서 종료
//! 4. 싱크를 등록 순서대로 닫되, 유예 시간(기본 2초)을 초과하면 경고

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use wasmward_core::collector::Collector;
use wasmward_core::config::PipelineConfig;
use wasmward_core::error::{PipelineError, WasmwardError};
use wasmward_core::sink::DynSink;
use wasmward_engine::RuleRegistry;

use crate::detector::spawn_detector_task;
use crate::fanin::spawn_fanin_task;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 파이프라인 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상 동작 중
    Healthy,
    /// 성능 저하 (서비스는 계속 동작)
    Degraded(String),
    /// 비정상 — 서비스 불가 상태
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 이벤트 파이프라인
///
/// # 사용 예시
/// ```ignore
/// let pipeline = EventPipelineBuilder::new()
///     .config(config.pipeline.clone())
///     .registry(registry)
///     .sinks(multi_sink)
///     .collector(Box::new(process_collector))
///     .build()?;
///
/// pipeline.start()?;
/// // ...
/// pipeline.stop().await?;
/// ```
pub struct EventPipeline {
    config: PipelineConfig,
    state: PipelineState,
    registry: Arc<RuleRegistry>,
    sinks: Arc<dyn DynSink>,
    collectors: Vec<Box<dyn Collector>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
    processed: Arc<AtomicU64>,
    detections: Arc<AtomicU64>,
}

impl std::fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPipeline").finish_non_exhaustive()
    }
}

impl EventPipeline {
    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 큐 포화로 드롭된 이벤트 수를 반환합니다.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 탐지 단계가 처리한 이벤트 수를 반환합니다.
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// 발행된 탐지 결과 수를 반환합니다.
    pub fn detection_count(&self) -> u64 {
        self.detections.load(Ordering::Relaxed)
    }

    /// 규칙 레지스트리에 대한 참조를 반환합니다.
    pub fn registry(&self) -> Arc<RuleRegistry> {
        Arc::clone(&self.registry)
    }

    /// 파이프라인을 시작합니다.
    ///
    /// 수집기를 시작하고 팬인/탐지 태스크를 스폰합니다. tokio 런타임
    /// 안에서 호출해야 합니다.
    pub fn start(&mut self) -> Result<(), WasmwardError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        tracing::info!(
            collectors = self.collectors.len(),
            queue_capacity = self.config.queue_capacity,
            "starting event pipeline"
        );

        self.cancel = CancellationToken::new();
        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_capacity);

        // 수집기 시작 + 팬인 태스크 스폰 (생산자 먼저)
        for collector in &mut self.collectors {
            let name = collector.name().to_owned();
            let events = collector.take_events().ok_or_else(|| {
                PipelineError::Collector {
                    name: name.clone(),
                    reason: "event stream already taken".to_owned(),
                }
            })?;
            collector.start(self.cancel.child_token())?;

            self.tasks.push(spawn_fanin_task(
                name,
                events,
                queue_tx.clone(),
                Arc::clone(&self.dropped),
                self.cancel.clone(),
            ));
        }
        drop(queue_tx);

        // 탐지 태스크 스폰 (단일 소비자)
        self.tasks.push(spawn_detector_task(
            queue_rx,
            Arc::clone(&self.registry),
            Arc::clone(&self.sinks),
            Arc::clone(&self.processed),
            Arc::clone(&self.detections),
            self.cancel.clone(),
        ));

        self.state = PipelineState::Running;
        tracing::info!("event pipeline started");
        Ok(())
    }

    /// 파이프라인을 정지합니다.
    ///
    /// cancellation token을 전파하고, 모든 태스크의 종료를 기다린 뒤,
    /// 싱크를 등록 순서대로 닫습니다. 싱크 플러시에는 설정된 유예
    /// 시간이 적용됩니다.
    pub async fn stop(&mut self) -> Result<(), WasmwardError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping event pipeline");
        self.cancel.cancel();

        // 수집기 정지 — 실패해도 나머지를 계속 정지
        for collector in &mut self.collectors {
            if let Err(e) = collector.stop() {
                tracing::warn!(collector = %collector.name(), error = %e, "failed to stop collector");
            }
        }

        // 팬인/탐지 태스크 종료 대기
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "pipeline task join failed");
            }
        }

        // 싱크 플러시 — 유예 시간 초과 시 경고 후 진행
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        match tokio::time::timeout(grace, self.sinks.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "sink close reported an error");
            }
            Err(_) => {
                tracing::warn!(
                    grace_secs = self.config.shutdown_grace_secs,
                    "sink close exceeded shutdown grace window"
                );
            }
        }

        self.state = PipelineState::Stopped;
        tracing::info!(
            processed = self.processed_count(),
            detections = self.detection_count(),
            dropped = self.dropped_count(),
            "event pipeline stopped"
        );
        Ok(())
    }

    /// 파이프라인의 현재 상태를 확인합니다.
    pub fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let dropped = self.dropped_count();
                if dropped > 0 {
                    HealthStatus::Degraded(format!("{dropped} events dropped under load"))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 이벤트 파이프라인 빌더
pub struct EventPipelineBuilder {
    config: PipelineConfig,
    registry: Option<Arc<RuleRegistry>>,
    sinks: Option<Arc<dyn DynSink>>,
    collectors: Vec<Box<dyn Collector>>,
}

impl EventPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            registry: None,
            sinks: None,
            collectors: Vec::new(),
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 규칙 레지스트리를 지정합니다 (필수).
    pub fn registry(mut self, registry: Arc<RuleRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 싱크 디스패처를 지정합니다 (필수).
    pub fn sinks(mut self, sinks: Arc<dyn DynSink>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// 수집기를 등록합니다. 등록 순서는 의미가 없습니다 — 수집기 간
    /// 이벤트 순서는 보장되지 않습니다.
    pub fn collector(mut self, collector: Box<dyn Collector>) -> Self {
        self.collectors.push(collector);
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<EventPipeline, WasmwardError> {
        let registry = self.registry.ok_or_else(|| {
            PipelineError::InitFailed("rule registry is required".to_owned())
        })?;
        let sinks = self.sinks.ok_or_else(|| {
            PipelineError::InitFailed("sink dispatcher is required".to_owned())
        })?;
        if self.config.queue_capacity == 0 {
            return Err(PipelineError::InitFailed(
                "queue_capacity must be at least 1".to_owned(),
            )
            .into());
        }

        Ok(EventPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            registry,
            sinks,
            collectors: self.collectors,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            dropped: Arc::new(AtomicU64::new(0)),
            processed: Arc::new(AtomicU64::new(0)),
            detections: Arc::new(AtomicU64::new(0)),
        })
    }
}

impl Default for EventPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
