//! 파이프라인 라이프사이클 관리
//!
//! [`PipelineManager`]는 활성 리스너와 전송기를 소유하는 단일 컨텍스트입니다.
//! 상태는 Stopped(초기)와 Running 두 가지이며, 모든 전이는
//! [`start`](PipelineManager::start)와 [`stop`](PipelineManager::stop)을 거칩니다.
//!
//! - `start`: 이미 실행 중이면 먼저 완전히 중지한 뒤 새로 시작합니다.
//!   같은 포트에 리스너가 두 개 바인드되는 일은 없습니다.
//!   바인드 실패 시 에러를 반환하고 Stopped 상태를 유지합니다.
//! - `stop`: 리스너(및 TCP 클라이언트 연결), 전송기를 닫습니다. 이미 Stopped면 no-op.
//! - `start_if_enabled`: 저장된 실행 플래그가 켜져 있을 때만 시작하며,
//!   실패해도 에러를 전파하지 않습니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), syslog2cef_pipeline::PipelineError> {
//! use std::sync::Arc;
//! use syslog2cef_core::config::Syslog2CefConfig;
//! use syslog2cef_core::store::ConfigStore;
//! use syslog2cef_pipeline::{PipelineManager, SampleBus};
//!
//! let store = Arc::new(ConfigStore::in_memory(Syslog2CefConfig::default()));
//! let manager = PipelineManager::new(store, SampleBus::new());
//! manager.start().await?;
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use metrics::gauge;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use syslog2cef_core::metrics as m;
use syslog2cef_core::pipeline::HealthStatus;
use syslog2cef_core::store::ConfigStore;

use crate::collector::{ListenerHandle, RecordSink, bind_listener};
use crate::error::PipelineError;
use crate::forwarder::Forwarder;
use crate::sample_bus::SampleBus;

/// 라이프사이클 호출 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    /// 실행 중 여부
    pub running: bool,
}

/// 한 번의 start/stop 사이클 동안 존재하는 리소스 묶음
struct ActiveSet {
    listener: ListenerHandle,
    forwarder: Arc<Forwarder>,
}

impl ActiveSet {
    async fn close(self) {
        self.listener.close().await;
        self.forwarder.close();
    }
}

/// 파이프라인 라이프사이클 관리자
pub struct PipelineManager {
    store: Arc<ConfigStore>,
    bus: SampleBus,
    active: Mutex<Option<ActiveSet>>,
}

impl PipelineManager {
    /// Stopped 상태의 관리자를 생성합니다.
    pub fn new(store: Arc<ConfigStore>, bus: SampleBus) -> Self {
        Self {
            store,
            bus,
            active: Mutex::new(None),
        }
    }

    /// 샘플 버스
    pub fn sample_bus(&self) -> &SampleBus {
        &self.bus
    }

    /// 설정 저장소
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// 파이프라인을 시작합니다.
    ///
    /// 실행 중이었다면 기존 리소스를 모두 해제한 뒤 현재 설정으로 다시 시작합니다.
    pub async fn start(&self) -> Result<PipelineStatus, PipelineError> {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            info!("pipeline already running, restarting");
            previous.close().await;
        }

        let config = self.store.pipeline();
        if let Err(e) = config.validate() {
            gauge!(m::PIPELINE_RUNNING).set(0.0);
            return Err(e.into());
        }

        let forwarder = Arc::new(Forwarder::new(Arc::clone(&self.store)));
        let sink = RecordSink::new(Arc::clone(&forwarder), self.bus.clone());

        match bind_listener(&config.input, sink).await {
            Ok(listener) => {
                info!(
                    input_protocol = %config.input.protocol,
                    input_addr = %listener.local_addr(),
                    output_protocol = %config.output.protocol,
                    output_host = config.output.host.as_str(),
                    output_port = config.output.port,
                    "pipeline started"
                );
                *active = Some(ActiveSet {
                    listener,
                    forwarder,
                });
                gauge!(m::PIPELINE_RUNNING).set(1.0);
                Ok(PipelineStatus { running: true })
            }
            Err(e) => {
                forwarder.close();
                gauge!(m::PIPELINE_RUNNING).set(0.0);
                error!(error = %e, "failed to start pipeline");
                Err(e)
            }
        }
    }

    /// 파이프라인을 중지합니다. 이미 중지 상태면 아무 일도 하지 않습니다.
    pub async fn stop(&self) -> PipelineStatus {
        let mut active = self.active.lock().await;

        match active.take() {
            Some(set) => {
                set.close().await;
                info!("pipeline stopped");
            }
            None => debug!("pipeline already stopped"),
        }

        gauge!(m::PIPELINE_RUNNING).set(0.0);
        PipelineStatus { running: false }
    }

    /// 저장된 실행 플래그가 켜져 있으면 시작합니다.
    ///
    /// 시작에 실패하면 경고만 남기고 Stopped 상태를 보장합니다.
    pub async fn start_if_enabled(&self) -> PipelineStatus {
        if !self.store.is_running() {
            debug!("pipeline not enabled, staying stopped");
            return PipelineStatus { running: false };
        }

        match self.start().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "could not resume pipeline, leaving it stopped");
                self.stop().await
            }
        }
    }

    /// 실행 중인지 확인합니다.
    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// 현재 상태
    pub async fn status(&self) -> PipelineStatus {
        PipelineStatus {
            running: self.is_running().await,
        }
    }

    /// 실행 중인 리스너의 바인드 주소
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|set| set.listener.local_addr())
    }

    /// 실행 중인 TCP 리스너의 열린 연결 수
    pub async fn active_connections(&self) -> usize {
        self.active
            .lock()
            .await
            .as_ref()
            .map_or(0, |set| set.listener.active_connections())
    }

    /// 헬스 체크
    ///
    /// 중지 상태는 운영자가 의도했을 수 있으므로 Unhealthy가 아닌 Degraded로 보고합니다.
    pub async fn health_check(&self) -> HealthStatus {
        match self.active.lock().await.as_ref() {
            Some(set) => {
                debug!(
                    protocol = %set.listener.protocol(),
                    connections = set.listener.active_connections(),
                    "pipeline health check"
                );
                HealthStatus::Healthy
            }
            None => HealthStatus::Degraded("pipeline stopped".to_owned()),
        }
    }
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineManager")
            .field("store", &self.store)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syslog2cef_core::config::{Protocol, Syslog2CefConfig};

    fn manager_on_ephemeral_port(protocol: Protocol) -> PipelineManager {
        let mut config = Syslog2CefConfig::default();
        config.input.protocol = protocol;
        config.input.address = "127.0.0.1".to_owned();
        // 포트 0이 검증을 통과하지 못하므로 미리 빈 포트를 찾음
        config.input.port = free_port(protocol);
        PipelineManager::new(Arc::new(ConfigStore::in_memory(config)), SampleBus::new())
    }

    fn free_port(protocol: Protocol) -> u16 {
        match protocol {
            Protocol::Udp => std::net::UdpSocket::bind("127.0.0.1:0")
                .unwrap()
                .local_addr()
                .unwrap()
                .port(),
            Protocol::Tcp => std::net::TcpListener::bind("127.0.0.1:0")
                .unwrap()
                .local_addr()
                .unwrap()
                .port(),
        }
    }

    #[tokio::test]
    async fn starts_stopped() {
        let manager = manager_on_ephemeral_port(Protocol::Udp);
        assert!(!manager.is_running().await);
        assert!(manager.local_addr().await.is_none());
        assert_eq!(manager.active_connections().await, 0);
        assert!(matches!(
            manager.health_check().await,
            HealthStatus::Degraded(_)
        ));
    }

    #[tokio::test]
    async fn start_then_stop() {
        let manager = manager_on_ephemeral_port(Protocol::Tcp);
        let status = manager.start().await.unwrap();
        assert!(status.running);
        assert!(manager.is_running().await);
        assert!(manager.health_check().await.is_healthy());

        let status = manager.stop().await;
        assert!(!status.running);
        assert!(!manager.is_running().await);
    }

    #[tokio::test]
    async fn stop_twice_is_noop() {
        let manager = manager_on_ephemeral_port(Protocol::Udp);
        assert!(!manager.stop().await.running);
        assert!(!manager.stop().await.running);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = Syslog2CefConfig::default();
        config.input.port = 0;
        let manager =
            PipelineManager::new(Arc::new(ConfigStore::in_memory(config)), SampleBus::new());
        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(!manager.is_running().await);
    }

    #[tokio::test]
    async fn start_if_enabled_respects_flag() {
        let manager = manager_on_ephemeral_port(Protocol::Udp);
        assert!(!manager.start_if_enabled().await.running);
        assert!(!manager.is_running().await);

        manager.store().set_running(true).await.unwrap();
        assert!(manager.start_if_enabled().await.running);
        assert!(manager.is_running().await);
        manager.stop().await;
    }

    #[test]
    fn status_serializes() {
        let json = serde_json::to_string(&PipelineStatus { running: true }).unwrap();
        assert_eq!(json, r#"{"running":true}"#);
    }
}
