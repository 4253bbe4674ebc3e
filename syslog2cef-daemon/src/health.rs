//! Daemon health reporting.
//!
//! Combines the pipeline's own health check with the persisted running
//! flag into a single [`DaemonHealth`] report.
//!
//! # Rule
//!
//! - running -> pipeline status (Healthy)
//! - stopped, flag off -> Degraded (operator stopped it)
//! - stopped, flag on -> Unhealthy (it should be running but is not)

use std::net::SocketAddr;

use serde::Serialize;

use syslog2cef_core::pipeline::HealthStatus;
use syslog2cef_pipeline::PipelineManager;

/// Health report for the whole daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall status.
    pub status: HealthStatus,
    /// Seconds since the orchestrator was built.
    pub uptime_secs: u64,
    /// Pipeline details.
    pub pipeline: PipelineHealth,
}

/// Health details for the translation pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineHealth {
    /// Whether a listener is currently bound.
    pub running: bool,
    /// Persisted running flag.
    pub enabled: bool,
    /// Bound listener address, if running.
    pub listen_addr: Option<SocketAddr>,
    /// Open TCP client connections.
    pub active_connections: usize,
    /// Status reported by the pipeline manager.
    pub status: HealthStatus,
}

impl PipelineHealth {
    /// Collect the current pipeline health from the manager.
    pub async fn collect(manager: &PipelineManager) -> Self {
        Self {
            running: manager.is_running().await,
            enabled: manager.store().is_running(),
            listen_addr: manager.local_addr().await,
            active_connections: manager.active_connections().await,
            status: manager.health_check().await,
        }
    }
}

/// Derive the overall daemon status from the pipeline report.
pub fn overall_status(pipeline: &PipelineHealth) -> HealthStatus {
    match (pipeline.running, pipeline.enabled) {
        (true, _) => pipeline.status.clone(),
        (false, true) => {
            HealthStatus::Unhealthy("pipeline is enabled but not running".to_owned())
        }
        (false, false) => match &pipeline.status {
            HealthStatus::Healthy => HealthStatus::Degraded("pipeline stopped".to_owned()),
            other => other.clone(),
        },
    }
}
