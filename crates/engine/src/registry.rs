//! 규칙 레지스트리 — 규칙 모듈의 컴파일, 저장, 열거, 언로드
//!
//! [`RuleRegistry`]는 프로세스 전역 wasmtime [`Engine`](wasmtime::Engine)을
//! 소유합니다. 모든 규칙 모듈은 이 엔진 아래에서 컴파일되어 코드 캐시를
//! 공유합니다.
//!
//! # 동시성
//!
//! 변경(load/unload/close)은 배타 락, 탐지는 공유 락 아래에서 현재
//! 스냅샷을 순회합니다. 컴파일은 CPU 바운드이므로 락 밖에서 수행됩니다.
//! 하나의 모듈이 여러 탐지 호출에서 동시에 인스턴스화될 수 있으며,
//! 호출마다 새 스토어를 생성하므로 호출 간 게스트 상태 누출이 없습니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use wasmtime::{Engine, Module};

use wasmward_core::error::EngineError;
use wasmward_core::event::{DetectionResult, Event};
use wasmward_core::metrics as m;

use crate::invoke;

/// 규칙 모듈 확장자 — 이 확장자를 가진 파일만 디렉토리 로드 대상입니다.
pub const RULE_MODULE_EXTENSION: &str = "wasm";

/// 레지스트리에 등록된 컴파일 완료 규칙 모듈
///
/// 컴파일 이후 불변입니다. `source`는 진단용 경로일 뿐이며,
/// 이후의 파일 변경은 반영되지 않습니다.
pub struct RuleModule {
    name: String,
    module: Module,
    source: PathBuf,
}

impl RuleModule {
    /// 규칙명을 반환합니다.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 컴파일된 모듈을 반환합니다.
    pub(crate) fn module(&self) -> &Module {
        &self.module
    }

    /// 규칙을 로드한 원본 경로를 반환합니다 (진단용).
    pub fn source(&self) -> &Path {
        &self.source
    }
}

struct RegistryInner {
    rules: HashMap<String, RuleModule>,
    closed: bool,
}

/// 규칙 레지스트리
///
/// `규칙명 → 컴파일된 모듈` 매핑과 공유 wasmtime 엔진을 소유합니다.
/// 규칙명은 레지스트리 내에서 유일하며, 같은 이름으로 다시 로드하면
/// 기존 엔트리가 원자적으로 교체됩니다.
pub struct RuleRegistry {
    engine: Engine,
    inner: RwLock<RegistryInner>,
}

impl RuleRegistry {
    /// 새 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self {
            engine: Engine::default(),
            inner: RwLock::new(RegistryInner {
                rules: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 규칙 파일을 읽고 컴파일하여 등록합니다.
    ///
    /// 같은 이름의 규칙이 이미 있으면 원자적으로 교체됩니다.
    /// 컴파일은 CPU 바운드이며 블로킹될 수 있습니다 — 비동기 문맥에서는
    /// `spawn_blocking`으로 호출하세요.
    pub fn load_rule(
        &self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<(), EngineError> {
        let name = name.into();
        let path = path.as_ref();

        if self.read().closed {
            return Err(EngineError::Closed);
        }

        let bytes = std::fs::read(path).map_err(|e| EngineError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let module = Module::new(&self.engine, &bytes).map_err(|e| EngineError::Compile {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        let mut inner = self.write();
        if inner.closed {
            return Err(EngineError::Closed);
        }
        let replaced = inner
            .rules
            .insert(
                name.clone(),
                RuleModule {
                    name: name.clone(),
                    module,
                    source: path.to_path_buf(),
                },
            )
            .is_some();
        let count = inner.rules.len();
        drop(inner);

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::ENGINE_RULES_LOADED).set(count as f64);
        tracing::info!(
            rule = %name,
            path = %path.display(),
            replaced = replaced,
            "loaded rule module"
        );
        Ok(())
    }

    /// 디렉토리를 재귀적으로 탐색하여 모든 규칙 모듈을 로드합니다.
    ///
    /// `.wasm` 확장자를 가진 일반 파일만 대상이며, 파일명 stem이
    /// 규칙명이 됩니다. 개별 파일의 첫 실패가 탐색을 중단시키고 그대로
    /// 반환됩니다 — 그 전에 로드된 규칙들은 유지됩니다.
    ///
    /// 로드된 규칙 수를 반환합니다.
    pub fn load_rules_from_dir(&self, dir: impl AsRef<Path>) -> Result<usize, EngineError> {
        let dir = dir.as_ref();
        let mut loaded = 0;
        self.walk_dir(dir, &mut loaded)?;
        tracing::info!(dir = %dir.display(), count = loaded, "loaded rule modules from directory");
        Ok(loaded)
    }

    fn walk_dir(&self, dir: &Path, loaded: &mut usize) -> Result<(), EngineError> {
        let entries = std::fs::read_dir(dir).map_err(|e| EngineError::Io {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        // 파일시스템 순서는 플랫폼마다 다르므로 이름순으로 고정
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Io {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            paths.push(entry.path());
        }
        paths.sort();

        for path in paths {
            let meta = std::fs::symlink_metadata(&path).map_err(|e| EngineError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

            if meta.is_dir() {
                self.walk_dir(&path, loaded)?;
                continue;
            }

            if !meta.is_file()
                || path.extension().is_none_or(|ext| ext != RULE_MODULE_EXTENSION)
            {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            self.load_rule(stem.to_owned(), &path)?;
            *loaded += 1;
        }

        Ok(())
    }

    /// 규칙을 언로드합니다.
    pub fn unload_rule(&self, name: &str) -> Result<(), EngineError> {
        let mut inner = self.write();
        if inner.closed {
            return Err(EngineError::Closed);
        }
        if inner.rules.remove(name).is_none() {
            return Err(EngineError::RuleNotFound {
                name: name.to_owned(),
            });
        }
        let count = inner.rules.len();
        drop(inner);

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::ENGINE_RULES_LOADED).set(count as f64);
        tracing::info!(rule = %name, "unloaded rule module");
        Ok(())
    }

    /// 현재 로드된 규칙명의 스냅샷을 반환합니다. 순서는 보장되지 않습니다.
    pub fn loaded_rules(&self) -> Result<Vec<String>, EngineError> {
        let inner = self.read();
        if inner.closed {
            return Err(EngineError::Closed);
        }
        Ok(inner.rules.keys().cloned().collect())
    }

    /// 이벤트 하나를 로드된 모든 규칙에 대해 실행합니다.
    ///
    /// 양의 위협 레벨을 보고한 규칙들의 탐지 결과를 반환합니다 (순서
    /// 미보장). 규칙 단위 실패는 경고 로그만 남기고 건너뜁니다 — 한
    /// 규칙의 실패가 다른 규칙의 탐지를 막지 않습니다. 집계 실패는
    /// 이벤트 직렬화 실패 또는 닫힌 레지스트리뿐입니다.
    pub fn detect_event(&self, event: &Event) -> Result<Vec<DetectionResult>, EngineError> {
        let payload = event
            .to_json()
            .map_err(|e| EngineError::Serialize(e.to_string()))?;

        let inner = self.read();
        if inner.closed {
            return Err(EngineError::Closed);
        }

        let mut results = Vec::new();
        for rule in inner.rules.values() {
            match invoke::run_rule(&self.engine, rule, &payload, event) {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => {
                    metrics::counter!(
                        m::ENGINE_RULE_FAILURES_TOTAL,
                        m::LABEL_RULE => rule.name().to_owned()
                    )
                    .increment(1);
                    tracing::warn!(rule = %rule.name(), error = %e, "rule invocation failed");
                }
            }
        }
        Ok(results)
    }

    /// 단일 규칙에 대해 이벤트를 실행합니다.
    ///
    /// [`detect_event`](Self::detect_event)와 달리 규칙 단위 에러를
    /// 그대로 반환합니다. 규칙 디버깅과 테스트에 사용됩니다.
    pub fn invoke_rule(
        &self,
        name: &str,
        event: &Event,
    ) -> Result<Option<DetectionResult>, EngineError> {
        let payload = event
            .to_json()
            .map_err(|e| EngineError::Serialize(e.to_string()))?;

        let inner = self.read();
        if inner.closed {
            return Err(EngineError::Closed);
        }
        let rule = inner
            .rules
            .get(name)
            .ok_or_else(|| EngineError::RuleNotFound {
                name: name.to_owned(),
            })?;
        invoke::run_rule(&self.engine, rule, &payload, event)
    }

    /// 레지스트리를 닫고 모든 규칙을 해제합니다.
    ///
    /// 이후의 모든 연산은 [`EngineError::Closed`]로 실패합니다.
    pub fn close(&self) -> Result<(), EngineError> {
        let mut inner = self.write();
        if inner.closed {
            return Err(EngineError::Closed);
        }
        inner.closed = true;
        inner.rules.clear();
        drop(inner);

        metrics::gauge!(m::ENGINE_RULES_LOADED).set(0.0);
        tracing::info!("rule registry closed");
        Ok(())
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
