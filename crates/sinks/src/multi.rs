//! 멀티 싱크 — 등록 순서 팬아웃 디스패처
//!
//! 탐지 결과 하나를 등록된 모든 싱크에 순서대로 전달합니다.
//! 싱크 하나의 실패는 경고 로그를 남기고 다음 싱크로 진행하며,
//! 집계 결과는 마지막으로 관측된 에러입니다.

use wasmward_core::error::WasmwardError;
use wasmward_core::event::DetectionResult;
use wasmward_core::metrics as m;
use wasmward_core::sink::{DynSink, Sink};

/// 멀티 싱크 디스패처
///
/// 등록 순서가 보존됩니다. `close`도 등록 순서대로 수행됩니다.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn DynSink>>,
}

impl MultiSink {
    /// 빈 멀티 싱크를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 싱크를 등록합니다. 등록 순서대로 결과가 전달됩니다.
    pub fn register(&mut self, sink: Box<dyn DynSink>) {
        self.sinks.push(sink);
    }

    /// 등록된 싱크 수를 반환합니다.
    pub fn count(&self) -> usize {
        self.sinks.len()
    }
}

impl Sink for MultiSink {
    fn name(&self) -> &str {
        "multi"
    }

    async fn handle(&self, result: &DetectionResult) -> Result<(), WasmwardError> {
        let mut last_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.handle(result).await {
                metrics::counter!(
                    m::SINK_ERRORS_TOTAL,
                    m::LABEL_SINK => sink.name().to_owned()
                )
                .increment(1);
                tracing::warn!(sink = %sink.name(), error = %e, "sink handler failed");
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), WasmwardError> {
        let mut last_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                tracing::warn!(sink = %sink.name(), error = %e, "failed to close sink");
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
