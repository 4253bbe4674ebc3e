//! TCP Syslog 리스너
//!
//! 개행으로 구분된 syslog 레코드를 TCP로 수신합니다.
//! 각 연결은 별도 태스크에서 처리되며 자신의 [`LineFramer`]를 가집니다.
//!
//! - 동시 연결 수는 `input.max_connections`로 제한됩니다.
//! - 연결 하나의 에러(읽기 실패, 프레임 크기 초과)는 그 연결만 닫습니다.
//! - 리스너가 닫히면 열린 클라이언트 연결도 모두 닫힙니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use metrics::gauge;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use syslog2cef_core::config::{InputConfig, Protocol};
use syslog2cef_core::metrics as m;

use super::{InboundRecord, LineFramer, ListenerHandle, RecordSink};
use crate::error::PipelineError;

/// accept 에러 후 재시도까지 대기 시간 (fd 고갈 시 busy loop 방지)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// 연결 처리 한도
#[derive(Debug, Clone, Copy)]
struct ConnectionLimits {
    /// 최대 동시 연결 수
    max_connections: usize,
    /// 미완성 레코드 최대 크기
    max_message_size: usize,
    /// 한 번에 읽는 바이트 수
    read_buffer_size: usize,
}

impl From<&InputConfig> for ConnectionLimits {
    fn from(input: &InputConfig) -> Self {
        Self {
            max_connections: input.max_connections,
            max_message_size: input.max_message_size,
            read_buffer_size: input.recv_buffer_size,
        }
    }
}

/// TCP 리스너를 바인드하고 accept 태스크를 시작합니다.
pub(crate) async fn bind(
    bind_addr: SocketAddr,
    input: &InputConfig,
    sink: RecordSink,
) -> Result<ListenerHandle, PipelineError> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|source| PipelineError::Bind {
            protocol: Protocol::Tcp,
            addr: bind_addr.to_string(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    info!(
        addr = %local_addr,
        max_connections = input.max_connections,
        "TCP syslog listener bound"
    );

    let cancel = CancellationToken::new();
    let connections = Arc::new(AtomicUsize::new(0));
    let task = tokio::spawn(accept_loop(
        listener,
        ConnectionLimits::from(input),
        sink,
        cancel.clone(),
        Arc::clone(&connections),
    ));

    Ok(ListenerHandle::new(
        Protocol::Tcp,
        local_addr,
        cancel,
        task,
        connections,
    ))
}

/// 취소될 때까지 연결을 수락합니다. 종료 시 모든 연결 태스크를 정리합니다.
async fn accept_loop(
    listener: TcpListener,
    limits: ConnectionLimits,
    sink: RecordSink,
    cancel: CancellationToken,
    active: Arc<AtomicUsize>,
) {
    // 연결 수 제한을 위한 세마포어
    let semaphore = Arc::new(Semaphore::new(limits.max_connections));
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("TCP syslog listener received shutdown signal");
                break;
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(error = %e, "TCP connection handler panicked");
                    }
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                            warn!(
                                %peer,
                                max = limits.max_connections,
                                "max connections reached, rejecting connection"
                            );
                            continue;
                        };
                        debug!(%peer, "accepted connection");
                        let guard = ConnectionGuard::new(Arc::clone(&active));
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            limits,
                            sink.clone(),
                            permit,
                            guard,
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "TCP accept error");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }

    // 리스너 소켓을 먼저 닫고, 남은 클라이언트 연결을 중단
    drop(listener);
    let open = connections.len();
    connections.shutdown().await;
    info!(closed_connections = open, "TCP syslog listener stopped");
}

/// 단일 TCP 연결을 처리합니다.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    limits: ConnectionLimits,
    sink: RecordSink,
    _permit: OwnedSemaphorePermit,
    _guard: ConnectionGuard,
) {
    let mut framer = LineFramer::new(limits.max_message_size);
    let mut buf = vec![0u8; limits.read_buffer_size];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                debug!(%peer, "connection closed by peer");
                break;
            }
            Ok(n) => {
                for line in framer.push(&buf[..n]) {
                    sink.dispatch(InboundRecord::new(line, Protocol::Tcp, peer));
                }
                if let Err(e) = framer.check_pending() {
                    warn!(%peer, error = %e, "message exceeds max size, closing connection");
                    break;
                }
            }
            Err(e) => {
                warn!(%peer, error = %e, "TCP read error, closing connection");
                break;
            }
        }
    }

    let discarded = framer.finish();
    if discarded > 0 {
        debug!(%peer, discarded, "discarded unterminated fragment");
    }
}

/// 활성 연결 수 추적 — 연결 태스크가 끝나거나 중단되면 감소합니다.
struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        let now = active.fetch_add(1, Ordering::AcqRel) + 1;
        gauge!(m::TCP_CONNECTIONS_ACTIVE).set(now as f64);
        Self { active }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let now = self.active.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        gauge!(m::TCP_CONNECTIONS_ACTIVE).set(now as f64);
    }
}
