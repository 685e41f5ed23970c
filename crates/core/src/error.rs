//! 에러 타입 — 도메인별 에러 정의

/// wasmward 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum WasmwardError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 규칙 엔진 에러
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 싱크 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 규칙 엔진 에러
///
/// 레지스트리 연산에서 발생한 에러는 호출자에게 전파되고,
/// 호출(invocation) 단계 에러는 규칙 단위로 격리되어 경고 로그만 남깁니다.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 규칙 파일 읽기 실패
    #[error("failed to read rule file {path}: {reason}")]
    Io { path: String, reason: String },

    /// 규칙 모듈 컴파일 실패
    #[error("failed to compile rule '{name}': {reason}")]
    Compile { name: String, reason: String },

    /// 규칙이 detect ABI를 만족하지 않음 (export 누락 또는 시그니처 불일치)
    #[error("rule '{rule}' does not satisfy the detect ABI: {reason}")]
    AbiMismatch { rule: String, reason: String },

    /// 게스트 선형 메모리가 이벤트를 담기에 부족함
    #[error(
        "insufficient memory in rule '{rule}': need {needed} bytes, have {available}"
    )]
    InsufficientMemory {
        rule: String,
        needed: usize,
        available: usize,
    },

    /// 규칙 실행 중 트랩 발생
    #[error("rule '{rule}' trapped during execution: {reason}")]
    Trap { rule: String, reason: String },

    /// 이벤트 직렬화 실패
    #[error("failed to serialize event: {0}")]
    Serialize(String),

    /// 규칙을 찾을 수 없음
    #[error("rule not found: {name}")]
    RuleNotFound { name: String },

    /// 레지스트리가 이미 닫힘
    #[error("rule registry is closed")]
    Closed,
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,

    /// 채널 통신 실패
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 수집기 에러
    #[error("collector error: {name}: {reason}")]
    Collector { name: String, reason: String },
}

/// 싱크 에러
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 웹훅 엔드포인트가 2xx 외 상태를 반환함
    #[error("webhook rejected with status {status}: {body}")]
    WebhookRejected { status: u16, body: String },

    /// 웹훅 전송 실패 (네트워크 계층)
    #[error("webhook transport error: {0}")]
    WebhookTransport(String),

    /// 결과 직렬화 실패
    #[error("failed to serialize detection result: {0}")]
    Serialize(String),

    /// 파일 쓰기 실패
    #[error("sink io error: {0}")]
    Io(String),
}
