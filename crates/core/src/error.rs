//! 에러 타입 — 도메인별 에러 정의

/// Syslog2CEF 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum Syslog2CefError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러 (바인드 실패 등)
    #[error("pipeline error: {0}")]
    Pipeline(String),

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

    /// 설정 직렬화 실패 (저장 시)
    #[error("failed to serialize config: {reason}")]
    SerializeFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// `InvalidValue` 에러를 간단히 생성합니다.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
