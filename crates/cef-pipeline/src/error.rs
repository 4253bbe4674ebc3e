//! 파이프라인 에러 타입
//!
//! [`PipelineError`]는 리스너 바인드, 프레이밍, 전송 과정의 에러를 표현합니다.
//! `From<PipelineError> for Syslog2CefError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.
//!
//! 번역(translate)은 실패하지 않으므로 대응하는 변형이 없습니다.

use syslog2cef_core::config::Protocol;
use syslog2cef_core::error::{ConfigError, Syslog2CefError};

/// 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 인바운드 소켓 바인드 실패 (포트 사용 중, 권한 없음 등)
    #[error("failed to bind {protocol} listener on {addr}: {source}")]
    Bind {
        /// 리스너 프로토콜
        protocol: Protocol,
        /// 바인드하려던 주소
        addr: String,
        /// 원인 I/O 에러
        #[source]
        source: std::io::Error,
    },

    /// 설정 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 미완성 TCP 프레임이 허용 크기를 초과함
    #[error("frame too large: {size} bytes pending without separator (max: {max})")]
    FrameTooLarge {
        /// 현재 버퍼에 남은 바이트 수
        size: usize,
        /// 허용 최대 크기
        max: usize,
    },

    /// CEF 레코드 전송 실패
    #[error("forward error: {protocol}: {reason}")]
    Forward {
        /// 출력 프로토콜
        protocol: Protocol,
        /// 실패 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for Syslog2CefError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Config(e) => Syslog2CefError::Config(e),
            PipelineError::Io(e) => Syslog2CefError::Io(e),
            other => Syslog2CefError::Pipeline(other.to_string()),
        }
    }
}
