//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 모든 크레이트가 공유하는 데이터 구조를 정의합니다.
//! 텔레메트리 서브레코드([`ProcessInfo`], [`NetworkInfo`], [`FileInfo`])와
//! 심각도([`Severity`])가 여기에 속합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 심각도 레벨
///
/// 탐지 결과의 심각도를 나타냅니다.
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
/// 와이어 포맷에서는 소문자 문자열(`"low"`, `"critical"` 등)로 직렬화됩니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성 — 위협 레벨 0에 예약되어 있으며 탐지 결과로 표면화되지 않습니다
    #[default]
    Info,
    /// 낮은 심각도 (위협 레벨 1..=3)
    Low,
    /// 중간 심각도 (위협 레벨 4..=5)
    Medium,
    /// 높은 심각도 (위협 레벨 6..=7)
    High,
    /// 치명적 — 즉시 대응 필요 (위협 레벨 8 이상)
    Critical,
}

impl Severity {
    /// 규칙이 반환한 위협 레벨을 심각도로 변환합니다.
    ///
    /// 심각도는 위협 레벨의 순수 함수입니다. 0 이하는 `Info`로 매핑되며,
    /// `Info`는 탐지 결과를 생성하지 않습니다.
    pub fn from_threat_level(level: i32) -> Self {
        match level {
            i32::MIN..=0 => Self::Info,
            1..=3 => Self::Low,
            4..=5 => Self::Medium,
            6..=7 => Self::High,
            _ => Self::Critical,
        }
    }

    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 와이어 포맷과 동일한 소문자 표현을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 프로세스 정보
///
/// 프로세스 수집기가 프로세스 테이블에서 조립한 서브레코드입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// 프로세스 ID
    pub pid: i32,
    /// 부모 프로세스 ID
    pub ppid: i32,
    /// 프로세스명
    pub name: String,
    /// 실행 파일 경로
    pub executable: String,
    /// 커맨드라인
    pub command_line: String,
    /// 실행 사용자 (UID 문자열)
    pub user: String,
    /// 실행 그룹 (GID 문자열)
    pub group: String,
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid={} ppid={} name={} exe={}",
            self.pid, self.ppid, self.name, self.executable,
        )
    }
}

/// 네트워크 연결 정보
///
/// 네트워크 수집기가 커널 TCP 테이블에서 파싱한 서브레코드입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// 프로토콜 (`tcp`, `tcp6`)
    pub protocol: String,
    /// 출발지 IP
    pub source_ip: String,
    /// 출발지 포트
    pub source_port: u16,
    /// 목적지 IP
    pub dest_ip: String,
    /// 목적지 포트
    pub dest_port: u16,
    /// 연결 방향 (`inbound`, `outbound`)
    pub direction: String,
    /// 전송 데이터 크기 (바이트)
    pub data_size: i64,
    /// 연결을 소유한 프로세스명 (알 수 있는 경우)
    pub process_name: String,
}

impl fmt::Display for NetworkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{} ({})",
            self.protocol,
            self.source_ip,
            self.source_port,
            self.dest_ip,
            self.dest_port,
            self.direction,
        )
    }
}

/// 파일 작업 정보
///
/// 파일 이벤트에 첨부되는 서브레코드입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// 파일 경로
    pub path: String,
    /// 작업 종류 (create, modify, delete 등)
    pub operation: String,
    /// 권한 문자열
    pub permissions: String,
    /// 작업을 수행한 프로세스명
    pub process_name: String,
    /// 작업을 수행한 사용자
    pub user: String,
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} by {}", self.operation, self.path, self.process_name)
    }
}
