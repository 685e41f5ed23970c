//! 설정 관리 — wasmward.toml 파싱 및 런타임 설정

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// wasmward 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WasmwardConfig {
    /// 일반 설정
    pub general: GeneralConfig,
    /// 규칙 로딩 설정
    pub rules: RulesConfig,
    /// 수집기 설정
    pub collectors: CollectorsConfig,
    /// 이벤트 파이프라인 설정
    pub pipeline: PipelineConfig,
    /// 웹훅 싱크 설정
    pub webhook: WebhookConfig,
    /// 메트릭 엔드포인트 설정
    pub metrics: MetricsConfig,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 탐지 결과를 기록할 파일 경로 (비우면 파일 출력 없음)
    pub log_file: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            log_file: None,
        }
    }
}

/// 규칙 로딩 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 규칙 경로 — `.wasm` 파일 하나 또는 규칙 디렉토리
    pub path: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: "/etc/wasmward/rules".to_owned(),
        }
    }
}

/// 수집기 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    /// 프로세스 수집기
    pub process: ProcessCollectorConfig,
    /// 네트워크 수집기
    pub network: NetworkCollectorConfig,
}

/// 프로세스 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessCollectorConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 프로세스 테이블 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 프로세스 테이블 루트 (테스트에서 픽스처 트리로 교체 가능)
    pub proc_root: String,
    /// 의심 커맨드라인 패턴 (정규식)
    pub suspicious_patterns: Vec<String>,
}

impl Default for ProcessCollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            proc_root: "/proc".to_owned(),
            suspicious_patterns: vec![
                r"\bnc\b".to_owned(),
                r"\bncat\b".to_owned(),
                r"\bsocat\b".to_owned(),
                r"/bin/(ba|z)?sh\s+-i".to_owned(),
                r"\b(wget|curl)\b.+\|\s*(ba)?sh".to_owned(),
                r"\b(python|perl|ruby)\b.+socket".to_owned(),
            ],
        }
    }
}

/// 네트워크 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCollectorConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// TCP 테이블 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// TCP 테이블 루트 (테스트에서 픽스처 트리로 교체 가능)
    pub proc_root: String,
    /// 의심 원격 포트 목록
    pub suspicious_ports: Vec<u16>,
}

impl Default for NetworkCollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 10_000,
            proc_root: "/proc".to_owned(),
            suspicious_ports: vec![22, 23, 3389, 4444, 5555, 6666, 7777, 8888, 9999],
        }
    }
}

/// 이벤트 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 팬인 큐 용량 (모든 수집기가 공유)
    pub queue_capacity: usize,
    /// 수집기별 출력 채널 용량
    pub collector_channel_capacity: usize,
    /// 종료 시 싱크 플러시 유예 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            collector_channel_capacity: 1000,
            shutdown_grace_secs: 2,
        }
    }
}

/// 웹훅 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// 알림을 POST할 URL (비우면 웹훅 싱크 비활성)
    pub url: Option<String>,
    /// 배치 플러시 임계값
    pub batch_size: usize,
    /// HTTP 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 추가 요청 헤더
    pub headers: BTreeMap<String, String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            batch_size: 10,
            timeout_secs: 30,
            headers: BTreeMap::new(),
        }
    }
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 노출 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9184,
            endpoint: "/metrics".to_owned(),
        }
    }
}

impl WasmwardConfig {
    /// TOML 설정 파일을 로드합니다.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })
    }

    /// 설정 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.general.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!(
                    "unknown format '{}', expected 'json' or 'pretty'",
                    self.general.log_format
                ),
            });
        }

        if self.rules.path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "rules.path".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.queue_capacity".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        if self.pipeline.collector_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.collector_channel_capacity".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        if self.webhook.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "webhook.batch_size".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        if let Some(url) = &self.webhook.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: "webhook.url".to_owned(),
                    reason: "must start with http:// or https://".to_owned(),
                });
            }
        }

        for pattern in &self.collectors.process.suspicious_patterns {
            if pattern.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "collectors.process.suspicious_patterns".to_owned(),
                    reason: "patterns must not be empty".to_owned(),
                });
            }
        }

        Ok(())
    }
}
