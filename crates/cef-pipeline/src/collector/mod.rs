//! 인바운드 리스너 — syslog 레코드를 네트워크에서 수신합니다.
//!
//! # 리스너
//! - [`syslog_udp`]: 데이터그램 하나가 레코드 하나
//! - [`syslog_tcp`]: 연결별 [`LineFramer`]로 개행 구분 레코드 추출
//!
//! # 흐름
//! 리스너는 완성된 레코드마다 [`InboundRecord`]를 만들어 [`RecordSink`]에
//! 넘깁니다. 싱크는 번역 → 전송 → 샘플 발행을 같은 흐름에서 수행합니다.
//! 전송은 fire-and-forget 이므로 다음 레코드 읽기를 막지 않습니다.
//!
//! 리스너 리소스(소켓, 클라이언트 연결)는 [`ListenerHandle`]이 소유하며
//! [`ListenerHandle::close`]가 끝나면 포트가 해제된 상태가 보장됩니다.

pub mod framing;
pub mod syslog_tcp;
pub mod syslog_udp;

pub use framing::LineFramer;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use syslog2cef_core::config::{InputConfig, Protocol};
use syslog2cef_core::error::ConfigError;
use syslog2cef_core::event::Sample;
use syslog2cef_core::metrics as m;

use crate::error::PipelineError;
use crate::forwarder::Forwarder;
use crate::sample_bus::SampleBus;
use crate::translator;

/// 수신된 레코드 하나
///
/// 리스너가 생성하고 [`RecordSink`]가 소비합니다.
#[derive(Debug, Clone)]
pub struct InboundRecord {
    /// 레코드 텍스트 (UDP는 원본 그대로, TCP는 trim 된 라인)
    pub text: String,
    /// 수신 프로토콜
    pub protocol: Protocol,
    /// 송신 측 주소
    pub peer: SocketAddr,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
}

impl InboundRecord {
    /// 새 레코드를 생성합니다.
    pub fn new(text: impl Into<String>, protocol: Protocol, peer: SocketAddr) -> Self {
        Self {
            text: text.into(),
            protocol,
            peer,
            received_at: Utc::now(),
        }
    }

    /// 샘플의 `from` 태그 (`"UDP 10.0.0.1:5140"`)
    pub fn source_tag(&self) -> String {
        format!("{} {}", self.protocol.as_upper(), self.peer)
    }
}

/// 레코드 처리기 — 번역, 전송, 샘플 발행
#[derive(Clone)]
pub struct RecordSink {
    forwarder: Arc<Forwarder>,
    bus: SampleBus,
}

impl RecordSink {
    /// 새 싱크를 생성합니다.
    pub fn new(forwarder: Arc<Forwarder>, bus: SampleBus) -> Self {
        Self { forwarder, bus }
    }

    /// 레코드 하나를 처리합니다.
    pub fn dispatch(&self, record: InboundRecord) {
        counter!(m::RECORDS_RECEIVED_TOTAL, m::LABEL_PROTOCOL => record.protocol.as_str())
            .increment(1);

        let cef = translator::translate(&record.text, record.protocol);
        trace!(from = %record.peer, cef = cef.as_str(), "record translated");

        self.forwarder.send(cef.clone());

        let sample = Sample {
            from: record.source_tag(),
            when: record.received_at,
            raw: record.text,
            cef,
        };
        self.bus.publish(&sample);
    }
}

/// 바인드된 리스너와 그 하위 리소스의 소유권
#[derive(Debug)]
pub struct ListenerHandle {
    protocol: Protocol,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    connections: Arc<AtomicUsize>,
}

impl ListenerHandle {
    pub(crate) fn new(
        protocol: Protocol,
        local_addr: SocketAddr,
        cancel: CancellationToken,
        task: JoinHandle<()>,
        connections: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            protocol,
            local_addr,
            cancel,
            task,
            connections,
        }
    }

    /// 리스너 프로토콜
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// 실제 바인드된 주소 (포트 0으로 바인드한 경우 할당된 포트 포함)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 현재 열린 클라이언트 연결 수 (UDP는 항상 0)
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// 리스너를 닫고 모든 클라이언트 연결이 정리될 때까지 기다립니다.
    pub async fn close(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(protocol = %self.protocol, error = %e, "listener task ended abnormally");
        }
        debug!(protocol = %self.protocol, addr = %self.local_addr, "listener closed");
    }
}

/// 입력 설정에 맞는 리스너를 바인드합니다.
///
/// 바인드가 성공해야만 핸들을 반환하므로, 포트 충돌은 이 호출에서 바로 드러납니다.
pub async fn bind_listener(
    input: &InputConfig,
    sink: RecordSink,
) -> Result<ListenerHandle, PipelineError> {
    let bind_addr = bind_address(input)?;
    match input.protocol {
        Protocol::Udp => syslog_udp::bind(bind_addr, input, sink).await,
        Protocol::Tcp => syslog_tcp::bind(bind_addr, input, sink).await,
    }
}

fn bind_address(input: &InputConfig) -> Result<SocketAddr, PipelineError> {
    let ip: IpAddr = input.address.parse().map_err(|_| {
        ConfigError::invalid(
            "input.address",
            format!("'{}' is not an IP address", input.address),
        )
    })?;
    Ok(SocketAddr::new(ip, input.port))
}
