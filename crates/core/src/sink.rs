//! 싱크 계약 — 탐지 결과 소비자의 인터페이스
//!
//! [`Sink`] trait은 모든 탐지 결과 소비자(로그, 웹훅, 메트릭)가 구현하는
//! 인터페이스입니다. 싱크는 내부적으로 직렬화됩니다 — `handle` 호출은
//! 싱크별 배타 락 아래에서 순차 처리됩니다.

use std::future::Future;
use std::pin::Pin;

use crate::error::WasmwardError;
use crate::event::DetectionResult;

/// dyn-compatible Future 타입 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 탐지 결과를 소비하는 싱크 trait
///
/// # 에러 규율
/// 한 싱크의 실패는 다른 싱크를 막지 않습니다. 디스패처는 실패를
/// 경고 로그로 남기고 다음 싱크로 진행합니다.
pub trait Sink: Send + Sync {
    /// 싱크 이름 (로깅 및 에러 보고에 사용)
    fn name(&self) -> &str;

    /// 탐지 결과 하나를 처리합니다.
    ///
    /// 내부 상태는 배타 락으로 보호되므로 `&self`로 호출됩니다.
    fn handle(
        &self,
        result: &DetectionResult,
    ) -> impl Future<Output = Result<(), WasmwardError>> + Send;

    /// 싱크를 닫습니다.
    ///
    /// 버퍼링된 결과를 플러시하고 리소스를 정리합니다.
    fn close(&self) -> impl Future<Output = Result<(), WasmwardError>> + Send;
}

/// dyn-compatible 싱크 trait
///
/// `Sink` trait은 RPITIT를 사용하므로 `dyn Sink`가 불가합니다.
/// `DynSink`는 `BoxFuture`를 반환하여 `Vec<Box<dyn DynSink>>`로
/// 싱크를 등록 순서대로 관리할 수 있게 합니다.
pub trait DynSink: Send + Sync {
    /// 싱크 이름을 반환합니다.
    fn name(&self) -> &str;

    /// 탐지 결과 하나를 처리합니다.
    fn handle<'a>(
        &'a self,
        result: &'a DetectionResult,
    ) -> BoxFuture<'a, Result<(), WasmwardError>>;

    /// 싱크를 닫습니다.
    fn close(&self) -> BoxFuture<'_, Result<(), WasmwardError>>;
}

/// `Arc`로 감싼 싱크도 싱크입니다.
///
/// 디스패처에 등록한 싱크를 호출자가 계속 관찰해야 할 때
/// (메트릭 스냅샷 조회, 테스트 검증 등) 사용합니다.
impl<T: Sink> Sink for std::sync::Arc<T> {
    fn name(&self) -> &str {
        T::name(self)
    }

    async fn handle(&self, result: &DetectionResult) -> Result<(), WasmwardError> {
        T::handle(self, result).await
    }

    async fn close(&self) -> Result<(), WasmwardError> {
        T::close(self).await
    }
}

/// Sink를 구현한 타입은 자동으로 DynSink도 구현됩니다.
impl<T: Sink> DynSink for T {
    fn name(&self) -> &str {
        Sink::name(self)
    }

    fn handle<'a>(
        &'a self,
        result: &'a DetectionResult,
    ) -> BoxFuture<'a, Result<(), WasmwardError>> {
        Box::pin(Sink::handle(self, result))
    }

    fn close(&self) -> BoxFuture<'_, Result<(), WasmwardError>> {
        Box::pin(Sink::close(self))
    }
}
