//! wasmward-sinks — 탐지 결과 소비자
//!
//! 탐지 결과를 받아 처리하는 싱크 구현을 제공합니다:
//! - [`LogSink`]: 평탄화된 pretty JSON을 파일과 구조화 로그로 출력
//! - [`WebhookSink`]: 크기 트리거 배치로 HTTP POST
//! - [`MetricsSink`]: 규칙/심각도별 카운터와 텍스트 노출 형식
//! - [`MultiSink`]: 등록 순서 팬아웃 디스패처
//!
//! 모든 싱크는 `wasmward_core::sink::Sink` 계약을 구현하며 내부적으로
//! 직렬화됩니다. 한 싱크의 실패는 다른 싱크를 막지 않습니다.

pub mod log;
pub mod metrics;
pub mod multi;
pub mod webhook;

pub use log::LogSink;
pub use metrics::MetricsSink;
pub use multi::MultiSink;
pub use webhook::{WebhookSink, WebhookSinkBuilder};
