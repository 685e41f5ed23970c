//! 이벤트 모델 — 호스트 텔레메트리와 탐지 결과의 기본 단위
//!
//! 수집기가 발행하는 [`Event`]와 규칙 실행이 생성하는 [`DetectionResult`]를
//! 정의합니다. 이벤트는 발행 이후 불변이며, 소비자는 항상 소유된 복사본을
//! 전달받습니다.
//!
//! # 와이어 포맷
//!
//! 이벤트는 `{id, type, timestamp, source, data}` 형태의 JSON 객체로
//! 직렬화됩니다. `data`는 이벤트 종류별 서브레코드를 담는 객체이며,
//! 이 직렬화 형식이 샌드박스 규칙과의 상호운용 경계입니다 — 메모리 내
//! 표현이 아니라 JSON 형식이 계약입니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FileInfo, NetworkInfo, ProcessInfo, Severity};

/// 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// 프로세스 생성/활동 이벤트
    Process,
    /// 네트워크 연결 이벤트
    Network,
    /// 파일 작업 이벤트
    File,
}

impl EventKind {
    /// 와이어 포맷과 동일한 소문자 표현을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Network => "network",
            Self::File => "file",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 속성 값 — 이벤트 속성 백에 담을 수 있는 고정 합 타입
///
/// 문자열, 정수, 실수, 불리언, 중첩 백만 허용됩니다.
/// untagged 직렬화로 JSON 스칼라/객체에 그대로 대응됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// 불리언
    Bool(bool),
    /// 64비트 정수
    Int(i64),
    /// 64비트 실수
    Float(f64),
    /// 문자열
    Text(String),
    /// 중첩 속성 백
    Bag(AttrMap),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// 문자열 키 속성 백
pub type AttrMap = BTreeMap<String, AttrValue>;

/// 프로세스 이벤트 페이로드
///
/// `action`은 수집기가 붙이는 마커(`"create"`, `"suspicious_activity"` 등)이며,
/// 나머지 동적 속성은 `extra`로 평탄화되어 와이어 포맷에 그대로 나타납니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessPayload {
    /// 이벤트 액션 마커
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// 프로세스 서브레코드
    pub process: ProcessInfo,
    /// 추가 속성 (와이어 포맷에서 평탄화됨)
    #[serde(flatten, default)]
    pub extra: AttrMap,
}

/// 네트워크 이벤트 페이로드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkPayload {
    /// 이벤트 액션 마커
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// 네트워크 서브레코드
    pub network: NetworkInfo,
    /// 추가 속성 (와이어 포맷에서 평탄화됨)
    #[serde(flatten, default)]
    pub extra: AttrMap,
}

/// 파일 이벤트 페이로드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilePayload {
    /// 이벤트 액션 마커
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// 파일 서브레코드
    pub file: FileInfo,
    /// 추가 속성 (와이어 포맷에서 평탄화됨)
    #[serde(flatten, default)]
    pub extra: AttrMap,
}

/// 이벤트 페이로드 — 종류별 태그드 합 타입
///
/// untagged 직렬화로 와이어 포맷의 `data` 객체에 그대로 대응됩니다.
/// 종류별 서브레코드 키(`process`/`network`/`file`)가 있으면 해당 변형으로,
/// 없으면 [`EventPayload::Generic`] 속성 백으로 역직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// 프로세스 페이로드
    Process(ProcessPayload),
    /// 네트워크 페이로드
    Network(NetworkPayload),
    /// 파일 페이로드
    File(FilePayload),
    /// 서브레코드가 없는 일반 속성 백
    Generic(AttrMap),
}

impl EventPayload {
    /// 프로세스 서브레코드를 반환합니다 (프로세스 페이로드인 경우).
    pub fn process(&self) -> Option<&ProcessInfo> {
        match self {
            Self::Process(p) => Some(&p.process),
            _ => None,
        }
    }

    /// 네트워크 서브레코드를 반환합니다 (네트워크 페이로드인 경우).
    pub fn network(&self) -> Option<&NetworkInfo> {
        match self {
            Self::Network(p) => Some(&p.network),
            _ => None,
        }
    }

    /// 파일 서브레코드를 반환합니다 (파일 페이로드인 경우).
    pub fn file(&self) -> Option<&FileInfo> {
        match self {
            Self::File(p) => Some(&p.file),
            _ => None,
        }
    }

    /// 액션 마커를 반환합니다.
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::Process(p) => p.action.as_deref(),
            Self::Network(p) => p.action.as_deref(),
            Self::File(p) => p.action.as_deref(),
            Self::Generic(_) => None,
        }
    }
}

/// 호스트 텔레메트리 이벤트
///
/// 수집기가 생성하여 파이프라인에 발행하는 불변 레코드입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 종류
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// 발생 시각 (RFC-3339)
    pub timestamp: DateTime<Utc>,
    /// 발행한 수집기 레이블
    pub source: String,
    /// 종류별 페이로드
    pub data: EventPayload,
}

impl Event {
    /// 새 이벤트를 생성합니다. ID는 UUID v4, 시각은 현재 시각입니다.
    pub fn new(kind: EventKind, source: impl Into<String>, data: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            timestamp: Utc::now(),
            source: source.into(),
            data,
        }
    }

    /// 프로세스 이벤트를 생성합니다.
    pub fn process(source: impl Into<String>, payload: ProcessPayload) -> Self {
        Self::new(EventKind::Process, source, EventPayload::Process(payload))
    }

    /// 네트워크 이벤트를 생성합니다.
    pub fn network(source: impl Into<String>, payload: NetworkPayload) -> Self {
        Self::new(EventKind::Network, source, EventPayload::Network(payload))
    }

    /// 파일 이벤트를 생성합니다.
    pub fn file(source: impl Into<String>, payload: FilePayload) -> Self {
        Self::new(EventKind::File, source, EventPayload::File(payload))
    }

    /// 이벤트를 와이어 포맷 JSON 바이트로 직렬화합니다.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// 와이어 포맷 JSON 바이트에서 이벤트를 복원합니다.
    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event[{}] kind={} source={}",
            &self.id[..8.min(self.id.len())],
            self.kind,
            self.source,
        )
    }
}

/// 탐지 결과
///
/// 양의 위협 레벨을 보고한 규칙 호출이 생성합니다.
/// 원본 이벤트 전체가 복사되어 포함됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// 탐지한 규칙명
    pub rule_name: String,
    /// 심각도 (위협 레벨의 순수 함수)
    pub severity: Severity,
    /// 위협 플래그 — 표면화된 결과는 항상 true
    pub threat: bool,
    /// 신뢰도 (`min(1.0, level / 10.0)`)
    pub confidence: f64,
    /// 사람용 설명
    pub description: String,
    /// 원본 이벤트 (복사본)
    pub event: Event,
    /// 선택적 메타데이터 백
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AttrMap>,
}

impl DetectionResult {
    /// 위협 레벨에서 탐지 결과를 구성합니다.
    ///
    /// 레벨이 0 이하이면 결과가 생성되지 않습니다 (`None`).
    /// 심각도와 신뢰도는 레벨의 순수 함수입니다.
    pub fn from_threat_level(rule_name: impl Into<String>, level: i32, event: Event) -> Option<Self> {
        if level <= 0 {
            return None;
        }
        let rule_name = rule_name.into();
        Some(Self {
            description: format!("Threat detected by rule {rule_name}"),
            rule_name,
            severity: Severity::from_threat_level(level),
            threat: true,
            confidence: (f64::from(level) / 10.0).min(1.0),
            event,
            metadata: None,
        })
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] rule={} confidence={:.1} event={}",
            self.severity, self.rule_name, self.confidence, self.event.id,
        )
    }
}
