//! 아웃바운드 전송기 — CEF 라인을 설정된 수신 측으로 보냅니다.
//!
//! [`Forwarder::send`]는 호출자에게 에러를 돌려주지 않는 fire-and-forget 함수입니다.
//! 실패는 로그와 메트릭으로만 드러나며, 해당 레코드는 버려집니다.
//! 재시도, 버퍼링, 배압은 없습니다.
//!
//! 출력 설정은 호출마다 [`ConfigStore`]에서 새로 읽으므로, 실행 중 변경도
//! 바로 다음 레코드부터 적용됩니다.
//!
//! - UDP: 목적지를 전송마다 해석하고 (IPv4 주소 우선) 주소 체계별로 소켓을
//!   하나씩 지연 생성해 이후 모든 전송에 재사용합니다. 전송 실패가 있어도
//!   소켓은 유지합니다.
//! - TCP: 레코드마다 새 연결을 열어 라인 + `\n`을 쓰고 닫습니다.
//!
//! 호스트명은 tokio의 비동기 lookup으로 해석되므로 이벤트 루프를 막지 않습니다.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use metrics::counter;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use syslog2cef_core::config::{OutputConfig, Protocol};
use syslog2cef_core::metrics as m;
use syslog2cef_core::store::ConfigStore;

use crate::error::PipelineError;

/// CEF 레코드 전송기
///
/// 파이프라인 시작 시 생성되고 중지 시 [`Forwarder::close`]로 정리됩니다.
pub struct Forwarder {
    /// 출력 설정 접근자
    store: Arc<ConfigStore>,
    /// 재사용 UDP 소켓 (지연 생성, 전송 태스크와 공유)
    udp_sockets: Arc<Mutex<UdpSockets>>,
    /// 진행 중인 전송 취소 토큰
    cancel: CancellationToken,
}

/// 주소 체계별 재사용 UDP 소켓
#[derive(Debug, Default)]
struct UdpSockets {
    v4: Option<Arc<UdpSocket>>,
    v6: Option<Arc<UdpSocket>>,
    /// `close` 이후에는 새 소켓을 만들지 않습니다.
    closed: bool,
}

impl UdpSockets {
    fn is_open(&self) -> bool {
        self.v4.is_some() || self.v6.is_some()
    }

    /// `target`과 같은 주소 체계의 소켓을 반환합니다. 없으면 새로 만듭니다.
    fn get_or_bind(&mut self, target: SocketAddr) -> Result<Arc<UdpSocket>, PipelineError> {
        if self.closed {
            return Err(PipelineError::Forward {
                protocol: Protocol::Udp,
                reason: "forwarder closed".to_owned(),
            });
        }

        let (slot, unspecified) = match target {
            SocketAddr::V4(_) => (&mut self.v4, IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            SocketAddr::V6(_) => (&mut self.v6, IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
        };
        if let Some(socket) = slot.as_ref() {
            return Ok(Arc::clone(socket));
        }

        let socket = bind_udp(SocketAddr::new(unspecified, 0))
            .map(Arc::new)
            .map_err(|e| PipelineError::Forward {
                protocol: Protocol::Udp,
                reason: format!("failed to create socket: {e}"),
            })?;
        debug!(local = ?socket.local_addr().ok(), "outbound UDP socket created");

        *slot = Some(Arc::clone(&socket));
        Ok(socket)
    }

    fn close(&mut self) -> bool {
        self.closed = true;
        let v4 = self.v4.take();
        let v6 = self.v6.take();
        v4.is_some() || v6.is_some()
    }
}

impl Forwarder {
    /// 새 전송기를 생성합니다. 소켓은 첫 전송 시점에 만들어집니다.
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            udp_sockets: Arc::new(Mutex::new(UdpSockets::default())),
            cancel: CancellationToken::new(),
        }
    }

    /// CEF 라인 하나를 전송합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다. 실제 전송은 백그라운드 태스크에서
    /// 수행되며 이 함수는 즉시 반환합니다.
    pub fn send(&self, cef: String) {
        if self.cancel.is_cancelled() {
            debug!("forwarder closed, dropping record");
            return;
        }

        let output = self.store.pipeline().output;
        match output.protocol {
            Protocol::Udp => self.send_udp(cef, output),
            Protocol::Tcp => self.send_tcp(cef, output),
        }
    }

    /// 재사용 UDP 소켓이 하나라도 열려 있는지 확인합니다.
    pub fn has_udp_socket(&self) -> bool {
        self.udp_sockets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_open()
    }

    /// 진행 중인 전송을 취소하고 UDP 소켓을 닫습니다.
    pub fn close(&self) {
        self.cancel.cancel();
        let closed = self
            .udp_sockets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .close();
        if closed {
            debug!("outbound UDP sockets closed");
        }
    }

    fn send_udp(&self, cef: String, output: OutputConfig) {
        let sockets = Arc::clone(&self.udp_sockets);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => trace!("UDP forward cancelled"),
                result = forward_udp(&sockets, &cef, &output) => record_result(Protocol::Udp, result),
            }
        });
    }

    fn send_tcp(&self, cef: String, output: OutputConfig) {
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => trace!("TCP forward cancelled"),
                result = forward_tcp(cef, &output) => record_result(Protocol::Tcp, result),
            }
        });
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("udp_socket_open", &self.has_udp_socket())
            .field("closed", &self.cancel.is_cancelled())
            .finish()
    }
}

fn bind_udp(local: SocketAddr) -> std::io::Result<UdpSocket> {
    let std_socket = std::net::UdpSocket::bind(local)?;
    std_socket.set_nonblocking(true)?;
    UdpSocket::from_std(std_socket)
}

/// 출력 호스트를 해석합니다. IPv4 주소가 있으면 그것을, 없으면 첫 주소를 고릅니다.
async fn resolve_target(output: &OutputConfig) -> Result<SocketAddr, PipelineError> {
    let resolve_err = |reason: String| PipelineError::Forward {
        protocol: Protocol::Udp,
        reason: format!("resolve {}:{} failed: {reason}", output.host, output.port),
    };

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((output.host.as_str(), output.port))
        .await
        .map_err(|e| resolve_err(e.to_string()))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| resolve_err("no addresses".to_owned()))
}

async fn forward_udp(
    sockets: &Mutex<UdpSockets>,
    cef: &str,
    output: &OutputConfig,
) -> Result<(), PipelineError> {
    let target = resolve_target(output).await?;
    let socket = sockets
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get_or_bind(target)?;

    socket
        .send_to(cef.as_bytes(), target)
        .await
        .map(|_| ())
        .map_err(|e| PipelineError::Forward {
            protocol: Protocol::Udp,
            reason: format!("send to {target} failed: {e}"),
        })
}

async fn forward_tcp(cef: String, output: &OutputConfig) -> Result<(), PipelineError> {
    let forward_err = |e: std::io::Error| PipelineError::Forward {
        protocol: Protocol::Tcp,
        reason: format!("{}:{}: {e}", output.host, output.port),
    };

    let mut stream = TcpStream::connect((output.host.as_str(), output.port))
        .await
        .map_err(forward_err)?;

    let mut line = cef.into_bytes();
    line.push(b'\n');
    stream.write_all(&line).await.map_err(forward_err)?;
    stream.shutdown().await.map_err(forward_err)?;
    Ok(())
}

fn record_result(protocol: Protocol, result: Result<(), PipelineError>) {
    match result {
        Ok(()) => {
            counter!(m::RECORDS_FORWARDED_TOTAL, m::LABEL_PROTOCOL => protocol.as_str())
                .increment(1);
            trace!(%protocol, "CEF record forwarded");
        }
        Err(e) => {
            counter!(m::FORWARD_ERRORS_TOTAL, m::LABEL_PROTOCOL => protocol.as_str())
                .increment(1);
            warn!(error = %e, "failed to forward CEF record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use syslog2cef_core::config::Syslog2CefConfig;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    fn store_with_output(protocol: Protocol, port: u16) -> Arc<ConfigStore> {
        let mut config = Syslog2CefConfig::default();
        config.output.protocol = protocol;
        config.output.host = "127.0.0.1".to_owned();
        config.output.port = port;
        Arc::new(ConfigStore::in_memory(config))
    }

    async fn recv_text(receiver: &UdpSocket) -> (String, SocketAddr) {
        let mut buf = [0u8; 256];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        (String::from_utf8_lossy(&buf[..len]).into_owned(), from)
    }

    #[tokio::test]
    async fn udp_socket_is_created_lazily_and_reused() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let forwarder = Forwarder::new(store_with_output(Protocol::Udp, port));
        assert!(!forwarder.has_udp_socket());

        forwarder.send("CEF:0|first".to_owned());
        forwarder.send("CEF:0|second".to_owned());

        let mut received = Vec::new();
        let mut sources = Vec::new();
        for _ in 0..2 {
            let (text, from) = recv_text(&receiver).await;
            received.push(text);
            sources.push(from);
        }
        received.sort();
        assert_eq!(received, vec!["CEF:0|first", "CEF:0|second"]);
        // 같은 소켓에서 송신
        assert_eq!(sources[0], sources[1]);
        assert!(forwarder.has_udp_socket());
    }

    #[tokio::test]
    async fn failed_udp_send_keeps_socket() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let forwarder = Forwarder::new(store_with_output(Protocol::Udp, port));

        forwarder.send("CEF:0|first".to_owned());
        let (_, first_source) = recv_text(&receiver).await;

        // UDP 데이터그램 최대 크기를 넘으므로 send_to가 실패
        forwarder.send("x".repeat(70_000));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(forwarder.has_udp_socket());

        forwarder.send("CEF:0|second".to_owned());
        let (text, second_source) = recv_text(&receiver).await;
        assert_eq!(text, "CEF:0|second");
        assert_eq!(first_source, second_source);
    }

    #[tokio::test]
    async fn udp_forward_to_ipv6_literal() {
        // IPv6 루프백이 없는 환경에서는 건너뜀
        let Ok(receiver) = UdpSocket::bind("[::1]:0").await else {
            return;
        };
        let port = receiver.local_addr().unwrap().port();
        let mut config = Syslog2CefConfig::default();
        config.output.host = "::1".to_owned();
        config.output.port = port;
        let forwarder = Forwarder::new(Arc::new(ConfigStore::in_memory(config)));

        forwarder.send("CEF:0|v6".to_owned());
        let (text, from) = recv_text(&receiver).await;
        assert_eq!(text, "CEF:0|v6");
        assert!(from.is_ipv6());
    }

    #[tokio::test]
    async fn ipv4_and_ipv6_destinations_use_separate_sockets() {
        let Ok(v6_receiver) = UdpSocket::bind("[::1]:0").await else {
            return;
        };
        let v4_receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let store = store_with_output(Protocol::Udp, v4_receiver.local_addr().unwrap().port());
        let forwarder = Forwarder::new(Arc::clone(&store));

        forwarder.send("to-v4".to_owned());
        assert_eq!(recv_text(&v4_receiver).await.0, "to-v4");

        let patch = syslog2cef_core::config::ConfigPatch {
            output: Some(syslog2cef_core::config::OutputPatch {
                host: Some("::1".to_owned()),
                port: Some(u32::from(v6_receiver.local_addr().unwrap().port())),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.update(&patch).await.unwrap();

        forwarder.send("to-v6".to_owned());
        assert_eq!(recv_text(&v6_receiver).await.0, "to-v6");

        let sockets = forwarder.udp_sockets.lock().unwrap();
        assert!(sockets.v4.is_some());
        assert!(sockets.v6.is_some());
    }

    #[tokio::test]
    async fn tcp_forward_writes_line_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let forwarder = Forwarder::new(store_with_output(Protocol::Tcp, port));

        forwarder.send("CEF:0|tcp".to_owned());

        let (stream, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let mut lines = tokio::io::BufReader::new(stream).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("CEF:0|tcp"));
        // 송신 측이 연결을 닫았으므로 EOF
        assert_eq!(lines.next_line().await.unwrap(), None);
        assert!(!forwarder.has_udp_socket());
    }

    #[tokio::test]
    async fn tcp_forward_failure_is_swallowed() {
        // 닫힌 포트를 얻기 위해 바인드 후 즉시 해제
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let forwarder = Forwarder::new(store_with_output(Protocol::Tcp, port));
        forwarder.send("CEF:0|lost".to_owned());
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn close_drops_socket_and_rejects_new_sends() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let forwarder = Forwarder::new(store_with_output(Protocol::Udp, port));

        forwarder.send("CEF:0|before".to_owned());
        assert_eq!(recv_text(&receiver).await.0, "CEF:0|before");
        assert!(forwarder.has_udp_socket());

        forwarder.close();
        assert!(!forwarder.has_udp_socket());

        forwarder.send("CEF:0|after".to_owned());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!forwarder.has_udp_socket());
    }

    #[tokio::test]
    async fn output_config_is_read_per_send() {
        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let store = store_with_output(Protocol::Udp, first.local_addr().unwrap().port());
        let forwarder = Forwarder::new(Arc::clone(&store));

        forwarder.send("to-first".to_owned());
        assert_eq!(recv_text(&first).await.0, "to-first");

        let patch = syslog2cef_core::config::ConfigPatch {
            output: Some(syslog2cef_core::config::OutputPatch {
                port: Some(u32::from(second.local_addr().unwrap().port())),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.update(&patch).await.unwrap();

        forwarder.send("to-second".to_owned());
        assert_eq!(recv_text(&second).await.0, "to-second");
    }
}
