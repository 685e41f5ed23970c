//! 호출 코어 — (이벤트, 규칙) 쌍 하나의 샌드박스 실행
//!
//! 호출마다 새 [`Store`]를 만들고, 제한된 WASI 캐퍼빌리티(stdout/stderr
//! 상속만)를 부여한 뒤 모듈을 인스턴스화합니다. 직렬화된 이벤트를
//! 게스트 선형 메모리의 고정 오프셋에 기록하고 `detect`를 호출하여
//! 반환된 위협 레벨을 해석합니다.
//!
//! # 고정 오프셋 계약
//!
//! 호스트는 게스트 내부에서 메모리를 할당하지 않습니다 — 게스트 측
//! 할당자를 import하지도, 게스트 포인터를 읽지도 않습니다. 대신
//! 메모리 하위 1KiB를 게스트 스크래치 공간으로 예약하고, 그 직후인
//! [`EVENT_DATA_OFFSET`]에 이벤트를 기록합니다. 게스트 메모리가
//! `offset + len`을 담지 못하면 호출은 실패하며, 호스트는 게스트를
//! 대신해 메모리를 늘리지 않습니다.

use wasmtime::{Engine, Linker, Store};
use wasmtime_wasi::WasiCtx;
use wasmtime_wasi::sync::WasiCtxBuilder;

use wasmward_core::error::EngineError;
use wasmward_core::event::{DetectionResult, Event};

use crate::registry::RuleModule;

/// 이벤트 데이터가 기록되는 게스트 선형 메모리의 고정 오프셋 (바이트)
pub const EVENT_DATA_OFFSET: usize = 1024;

/// 규칙 하나에 대해 이벤트 하나를 실행합니다.
///
/// `payload`는 호출자가 이벤트당 한 번 직렬화한 JSON 바이트입니다.
/// 양의 위협 레벨이 반환되면 `Some(DetectionResult)`를, 레벨 0이면
/// `None`을 반환합니다.
pub(crate) fn run_rule(
    engine: &Engine,
    rule: &RuleModule,
    payload: &[u8],
    event: &Event,
) -> Result<Option<DetectionResult>, EngineError> {
    let mut linker: Linker<WasiCtx> = Linker::new(engine);
    wasmtime_wasi::add_to_linker(&mut linker, |ctx| ctx).map_err(|e| EngineError::Trap {
        rule: rule.name().to_owned(),
        reason: format!("failed to define WASI imports: {e}"),
    })?;

    // stdout/stderr 상속만 허용 — 파일시스템, 네트워크, 시계 캐퍼빌리티 없음
    let wasi = WasiCtxBuilder::new()
        .inherit_stdout()
        .inherit_stderr()
        .build();
    let mut store = Store::new(engine, wasi);

    let instance =
        linker
            .instantiate(&mut store, rule.module())
            .map_err(|e| EngineError::Trap {
                rule: rule.name().to_owned(),
                reason: format!("instantiation failed: {e}"),
            })?;

    let memory = instance.get_memory(&mut store, "memory").ok_or_else(|| {
        EngineError::AbiMismatch {
            rule: rule.name().to_owned(),
            reason: "missing exported linear memory 'memory'".to_owned(),
        }
    })?;

    let detect = instance
        .get_typed_func::<(i32, i32), i32>(&mut store, "detect")
        .map_err(|e| EngineError::AbiMismatch {
            rule: rule.name().to_owned(),
            reason: format!("missing or mistyped export 'detect(i32, i32) -> i32': {e}"),
        })?;

    let needed = EVENT_DATA_OFFSET + payload.len();
    let available = memory.data_size(&store);
    if needed > available {
        return Err(EngineError::InsufficientMemory {
            rule: rule.name().to_owned(),
            needed,
            available,
        });
    }

    memory
        .write(&mut store, EVENT_DATA_OFFSET, payload)
        .map_err(|e| EngineError::Trap {
            rule: rule.name().to_owned(),
            reason: format!("guest memory write failed: {e}"),
        })?;

    let len = i32::try_from(payload.len()).map_err(|_| {
        EngineError::Serialize("serialized event exceeds i32::MAX bytes".to_owned())
    })?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let offset = EVENT_DATA_OFFSET as i32;
    let level = detect
        .call(&mut store, (offset, len))
        .map_err(|e| EngineError::Trap {
            rule: rule.name().to_owned(),
            reason: e.to_string(),
        })?;

    tracing::debug!(rule = %rule.name(), level = level, event = %event.id, "rule evaluated");
    Ok(DetectionResult::from_threat_level(
        rule.name(),
        level,
        event.clone(),
    ))
}
