//! 팬인 단계 — 수집기별 출력 스트림을 공유 유한 큐로 병합
//!
//! 수집기마다 태스크 하나가 출력 스트림을 읽어 공유 큐로 복사합니다.
//! 큐가 가득 차면 새 이벤트를 드롭하고 경고를 남깁니다
//! (non-blocking drop-newest-on-full) — 수집기는 호스트를 정체시키지
//! 않습니다.
//!
//! 단일 수집기 내에서 이벤트 순서는 큐까지 보존됩니다. 수집기 간
//! 순서는 인터리브되며 보장되지 않습니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use wasmward_core::event::Event;
use wasmward_core::metrics as m;

/// 수집기 하나의 출력을 공유 큐로 복사하는 태스크를 스폰합니다.
///
/// 종료 조건:
/// - 업스트림 스트림 종료 (수집기 정지)
/// - cancellation token 발동 — 이미 수신한 이벤트는 마저 전달하고,
///   다음 큐 읽기에서 종료합니다
pub(crate) fn spawn_fanin_task(
    collector_name: String,
    mut events: mpsc::Receiver<Event>,
    queue: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                // 수신 이벤트를 우선 드레인한 뒤에 취소를 확인
                biased;

                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else {
                        tracing::debug!(collector = %collector_name, "collector stream closed");
                        break;
                    };
                    metrics::counter!(
                        m::PIPELINE_EVENTS_COLLECTED_TOTAL,
                        m::LABEL_COLLECTOR => collector_name.clone()
                    )
                    .increment(1);

                    match queue.try_send(event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(event)) => {
                            dropped.fetch_add(1, Ordering::Relaxed);
                            metrics::counter!(
                                m::PIPELINE_EVENTS_DROPPED_TOTAL,
                                m::LABEL_COLLECTOR => collector_name.clone()
                            )
                            .increment(1);
                            tracing::warn!(
                                collector = %collector_name,
                                event = %event.id,
                                "fan-in queue full, dropping event"
                            );
                        }
                        Err(TrySendError::Closed(_)) => {
                            tracing::debug!(collector = %collector_name, "fan-in queue closed");
                            break;
                        }
                    }
                }

                _ = cancel.cancelled() => {
                    break;
                }
            }
        }
        tracing::debug!(collector = %collector_name, "fan-in task exited");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wasmward_core::event::{AttrMap, EventKind, EventPayload};

    fn sample_event() -> Event {
        Event::new(
            EventKind::Process,
            "test",
            EventPayload::Generic(AttrMap::new()),
        )
    }

    #[tokio::test]
    async fn forwards_events_in_order() {
        let (collector_tx, collector_rx) = mpsc::channel(16);
        let (queue_tx, mut queue_rx) = mpsc::channel(16);
        let dropped = Arc::new(AtomicU64::new(0));

        let task = spawn_fanin_task(
            "test".to_owned(),
            collector_rx,
            queue_tx,
            Arc::clone(&dropped),
            CancellationToken::new(),
        );

        let mut ids = Vec::new();
        for _ in 0..5 {
            let event = sample_event();
            ids.push(event.id.clone());
            collector_tx.send(event).await.unwrap();
        }
        drop(collector_tx);

        let mut received = Vec::new();
        while let Some(event) = queue_rx.recv().await {
            received.push(event.id);
        }
        assert_eq!(received, ids);
        assert_eq!(dropped.load(Ordering::Relaxed), 0);

        task.await.unwrap();
    }

    #[tokio::test]
    async fn drops_newest_when_queue_full() {
        // 용량 4 큐에 10개 투입, 소비자 없음 → 4개 전달, 6개 드롭
        let (collector_tx, collector_rx) = mpsc::channel(16);
        let (queue_tx, mut queue_rx) = mpsc::channel(4);
        let dropped = Arc::new(AtomicU64::new(0));

        let task = spawn_fanin_task(
            "test".to_owned(),
            collector_rx,
            queue_tx,
            Arc::clone(&dropped),
            CancellationToken::new(),
        );

        for _ in 0..10 {
            collector_tx.send(sample_event()).await.unwrap();
        }
        drop(collector_tx);
        task.await.unwrap();

        assert_eq!(dropped.load(Ordering::Relaxed), 6);

        // 큐에는 먼저 도착한 4개만 남아 있음 (drop-newest)
        let mut queued = 0;
        while queue_rx.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, 4);
    }

    #[tokio::test]
    async fn no_drops_with_free_capacity() {
        let (collector_tx, collector_rx) = mpsc::channel(16);
        let (queue_tx, mut queue_rx) = mpsc::channel(100);
        let dropped = Arc::new(AtomicU64::new(0));

        let task = spawn_fanin_task(
            "test".to_owned(),
            collector_rx,
            queue_tx,
            Arc::clone(&dropped),
            CancellationToken::new(),
        );

        for _ in 0..50 {
            collector_tx.send(sample_event()).await.unwrap();
        }
        drop(collector_tx);
        task.await.unwrap();

        assert_eq!(dropped.load(Ordering::Relaxed), 0);
        let mut queued = 0;
        while queue_rx.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, 50);
    }

    #[tokio::test]
    async fn cancellation_stops_task() {
        let (_collector_tx, collector_rx) = mpsc::channel::<Event>(16);
        let (queue_tx, _queue_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let task = spawn_fanin_task(
            "test".to_owned(),
            collector_rx,
            queue_tx,
            Arc::new(AtomicU64::new(0)),
            cancel.clone(),
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("fan-in task should exit on cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn buffered_events_drain_before_cancel_exit() {
        let (collector_tx, collector_rx) = mpsc::channel(16);
        let (queue_tx, mut queue_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        // 태스크 스폰 전에 이벤트를 버퍼에 쌓아 두고 곧바로 취소
        for _ in 0..3 {
            collector_tx.send(sample_event()).await.unwrap();
        }
        cancel.cancel();

        let task = spawn_fanin_task(
            "test".to_owned(),
            collector_rx,
            queue_tx,
            Arc::new(AtomicU64::new(0)),
            cancel,
        );
        task.await.unwrap();

        // biased select로 이미 수신된 이벤트는 전달된 뒤 종료
        let mut queued = 0;
        while queue_rx.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, 3);
    }
}
