#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`translator`]: syslog 텍스트 → CEF 라인 (순수 함수, 실패하지 않음)
//! - [`collector`]: UDP/TCP 인바운드 리스너와 개행 프레이머
//! - [`forwarder`]: CEF 라인을 UDP/TCP로 전송 (fire-and-forget)
//! - [`sample_bus`]: 번역 결과 관찰자 레지스트리
//! - [`pipeline`]: 리스너/전송기 라이프사이클 관리 (start/stop)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! network -> Listener -> Translator -> Forwarder -> downstream collector
//!                            |
//!                            +------> SampleBus -> observers
//! ```

pub mod collector;
pub mod error;
pub mod forwarder;
pub mod pipeline;
pub mod sample_bus;
pub mod translator;

// --- 주요 타입 re-export ---

// 라이프사이클
pub use pipeline::{PipelineManager, PipelineStatus};

// 에러
pub use error::PipelineError;

// 번역기
pub use translator::{escape_extension_value, translate, translate_at};

// 수집기
pub use collector::{InboundRecord, LineFramer, ListenerHandle, RecordSink};

// 전송기
pub use forwarder::Forwarder;

// 샘플 버스
pub use sample_bus::{SampleBus, SubscriberId};
