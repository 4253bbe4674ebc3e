//! UDP Syslog 리스너
//!
//! 데이터그램 하나를 레코드 하나로 취급합니다. 데이터그램 내용은 trim 하지 않고
//! 그대로 번역기에 전달합니다. 수신 에러는 로그로만 남기고 수신을 계속합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use syslog2cef_core::config::{InputConfig, Protocol};

use super::{InboundRecord, ListenerHandle, RecordSink};
use crate::error::PipelineError;

/// UDP 소켓을 바인드하고 수신 태스크를 시작합니다.
pub(crate) async fn bind(
    bind_addr: SocketAddr,
    input: &InputConfig,
    sink: RecordSink,
) -> Result<ListenerHandle, PipelineError> {
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|source| PipelineError::Bind {
            protocol: Protocol::Udp,
            addr: bind_addr.to_string(),
            source,
        })?;
    let local_addr = socket.local_addr()?;

    info!(addr = %local_addr, "UDP syslog listener bound");

    let cancel = CancellationToken::new();
    let task = tokio::spawn(receive_loop(
        socket,
        input.recv_buffer_size,
        sink,
        cancel.clone(),
    ));

    Ok(ListenerHandle::new(
        Protocol::Udp,
        local_addr,
        cancel,
        task,
        Arc::new(AtomicUsize::new(0)),
    ))
}

/// 취소될 때까지 데이터그램을 수신합니다.
async fn receive_loop(
    socket: UdpSocket,
    recv_buffer_size: usize,
    sink: RecordSink,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; recv_buffer_size];

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("UDP syslog listener received shutdown signal");
                break;
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, peer)) => {
                        let raw = String::from_utf8_lossy(&buf[..len]).into_owned();
                        sink.dispatch(InboundRecord::new(raw, Protocol::Udp, peer));
                    }
                    Err(e) => {
                        warn!(error = %e, "UDP receive error");
                    }
                }
            }
        }
    }
}
