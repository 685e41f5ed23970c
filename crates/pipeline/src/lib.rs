//! wasmward-pipeline — 이벤트 팬인 파이프라인과 텔레메트리 수집기
//!
//! 수집기(다중 생산자) → 팬인 큐 → 탐지 단계(단일 소비자) → 싱크 팬아웃의
//! 토폴로지를 관리합니다.
//!
//! # 내부 아키텍처
//! ```text
//! Collectors -> (per-collector mpsc) -> fan-in tasks -> bounded queue
//!            -> detector (spawn_blocking sandbox invocation) -> sinks
//! ```
//!
//! # 백프레셔 정책
//!
//! 모든 생산자↔소비자 경계는 유한 큐입니다. 큐가 가득 차면 새 이벤트를
//! 드롭하고 드롭 카운터를 증가시킵니다 — 생산자는 절대 블로킹되지
//! 않습니다. 과부하 시 이벤트 손실을 감수하고 호스트 생존성을 지킵니다.

pub mod collector;
pub mod detector;
pub mod fanin;
pub mod pipeline;

pub use collector::network::NetworkCollector;
pub use collector::process::ProcessCollector;
pub use pipeline::{EventPipeline, EventPipelineBuilder, HealthStatus};
