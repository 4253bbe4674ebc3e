#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod store;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, Syslog2CefError};

// 설정
pub use config::{
    ConfigPatch, InputConfig, InputPatch, OutputConfig, OutputPatch, PipelineConfig, Protocol,
    Syslog2CefConfig,
};
pub use store::ConfigStore;

// 이벤트
pub use event::Sample;

// 상태
pub use pipeline::HealthStatus;
