//! 탐지 단계 — 단일 소비자 이벤트 처리 루프
//!
//! 팬인 큐에서 이벤트를 하나씩 꺼내 로드된 모든 규칙에 대해 실행하고,
//! 양성 탐지 결과를 싱크 디스패처에 전달합니다. 샌드박스 실행은 CPU
//! 바운드이므로 `spawn_blocking`으로 비동기 워커 밖에서 수행합니다.
//!
//! 취소 시 큐를 드레인하지 않고 다음 읽기에서 즉시 종료합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use wasmward_core::event::Event;
use wasmward_core::metrics as m;
use wasmward_core::sink::DynSink;
use wasmward_engine::RuleRegistry;

/// 탐지 루프 태스크를 스폰합니다.
pub(crate) fn spawn_detector_task(
    mut queue: mpsc::Receiver<Event>,
    registry: Arc<RuleRegistry>,
    sinks: Arc<dyn DynSink>,
    processed: Arc<AtomicU64>,
    detections: Arc<AtomicU64>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                // 취소를 우선 확인 — 드레인 없이 종료
                biased;

                _ = cancel.cancelled() => {
                    break;
                }

                maybe_event = queue.recv() => {
                    let Some(event) = maybe_event else {
                        tracing::debug!("fan-in queue closed, detector exiting");
                        break;
                    };
                    processed.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::PIPELINE_EVENTS_PROCESSED_TOTAL).increment(1);

                    let registry = Arc::clone(&registry);
                    let outcome = tokio::task::spawn_blocking(move || {
                        let results = registry.detect_event(&event);
                        (event, results)
                    })
                    .await;

                    let results = match outcome {
                        Ok((_event, Ok(results))) => results,
                        Ok((event, Err(e))) => {
                            tracing::warn!(
                                event = %event.id,
                                error = %e,
                                "threat detection failed for event"
                            );
                            continue;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "detection task failed to complete");
                            continue;
                        }
                    };

                    for result in results {
                        detections.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = sinks.handle(&result).await {
                            tracing::warn!(
                                rule = %result.rule_name,
                                error = %e,
                                "failed to dispatch detection result"
                            );
                        }
                    }
                }
            }
        }
        tracing::debug!("detector task exited");
    })
}
