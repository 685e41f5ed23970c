#![doc = include_str!("../README.md")]

pub mod collector;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod sink;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, EngineError, PipelineError, SinkError, WasmwardError};

// 설정
pub use config::WasmwardConfig;

// 이벤트
pub use event::{
    AttrMap, AttrValue, DetectionResult, Event, EventKind, EventPayload, FilePayload,
    NetworkPayload, ProcessPayload,
};

// 계약 trait
pub use collector::{Collector, CollectorStatus};
pub use sink::{BoxFuture, DynSink, Sink};

// 도메인 타입
pub use types::{FileInfo, NetworkInfo, ProcessInfo, Severity};
