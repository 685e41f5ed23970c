//! 수집기 계약 — 텔레메트리 생산자의 생명주기와 출력 스트림
//!
//! 호스트는 수집기 내부 구현을 알지 못하며, 이 계약만 가정합니다:
//! - `start`는 호출자를 블로킹하지 않습니다 (백그라운드 태스크 스폰)
//! - `stop` 이후 출력 스트림은 유한 시간 내에 종료됩니다
//! - 이벤트는 최대 한 번(at-most-once) 발행됩니다

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WasmwardError;
use crate::event::Event;

/// 수집기 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorStatus {
    /// 실행 대기 중
    Idle,
    /// 실행 중
    Running,
    /// 에러로 중단됨
    Error(String),
    /// 정상 종료됨
    Stopped,
}

/// 모든 텔레메트리 수집기가 구현하는 trait
///
/// 수집기는 생성 시 내부 유한 채널을 만들고, `start`에서 백그라운드
/// 태스크를 스폰하여 이벤트를 채널에 발행합니다. 파이프라인은
/// [`take_events`](Collector::take_events)로 수신측을 한 번 가져가
/// 팬인 큐로 복사합니다.
///
/// # 구현 예시
/// ```ignore
/// struct TickCollector { /* ... */ }
///
/// impl Collector for TickCollector {
///     fn name(&self) -> &str { "tick" }
///
///     fn start(&mut self, cancel: CancellationToken) -> Result<(), WasmwardError> {
///         let tx = self.tx.clone();
///         tokio::spawn(async move {
///             // cancel.cancelled()와 select하며 이벤트 발행
///         });
///         Ok(())
///     }
///
///     fn stop(&mut self) -> Result<(), WasmwardError> { Ok(()) }
///
///     fn take_events(&mut self) -> Option<mpsc::Receiver<Event>> {
///         self.rx.take()
///     }
/// }
/// ```
pub trait Collector: Send + Sync {
    /// 수집기 이름 (로깅 및 이벤트 source 레이블)
    fn name(&self) -> &str;

    /// 수집기를 시작합니다.
    ///
    /// 반드시 즉시 반환해야 하며, 실제 수집은 스폰된 태스크에서 수행합니다.
    /// 전달받은 cancellation token이 발동되면 발행을 멈춰야 합니다.
    fn start(&mut self, cancel: CancellationToken) -> Result<(), WasmwardError>;

    /// 수집기를 정지합니다.
    ///
    /// 호출 후 출력 스트림은 유한 시간 내에 종료되어야 합니다.
    fn stop(&mut self) -> Result<(), WasmwardError>;

    /// 이벤트 출력 스트림의 수신측을 가져갑니다.
    ///
    /// 수신측은 한 번만 가져갈 수 있으며, 두 번째 호출부터는 `None`을
    /// 반환합니다.
    fn take_events(&mut self) -> Option<mpsc::Receiver<Event>>;

    /// 현재 상태를 반환합니다.
    fn status(&self) -> CollectorStatus;
}
