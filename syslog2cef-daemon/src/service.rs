//! Lifecycle service -- pipeline start/stop with a persisted running flag.
//!
//! [`BridgeService`] is the operator-facing control surface. It wraps the
//! [`PipelineManager`] and records the desired run state in the config
//! document so the next boot resumes it.
//!
//! - `start`: start the pipeline, then persist `running = true`
//! - `stop`: stop the pipeline, then persist `running = false`
//! - `update_config`: normalize and persist a patch; if the input or output
//!   changed while the pipeline is enabled, the pipeline is stopped and the
//!   operator restarts it explicitly

use std::sync::Arc;

use syslog2cef_core::config::{ConfigPatch, Syslog2CefConfig};
use syslog2cef_core::error::Syslog2CefError;
use syslog2cef_core::store::ConfigStore;
use syslog2cef_pipeline::{PipelineManager, PipelineStatus};

/// Operator-facing pipeline control.
#[derive(Debug, Clone)]
pub struct BridgeService {
    manager: Arc<PipelineManager>,
}

/// Result of a configuration update.
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    /// The persisted document.
    pub config: Syslog2CefConfig,
    /// Whether the update changed the input or output section.
    pub io_changed: bool,
    /// Pipeline state after the update.
    pub status: PipelineStatus,
}

impl BridgeService {
    /// Wrap a pipeline manager.
    pub fn new(manager: Arc<PipelineManager>) -> Self {
        Self { manager }
    }

    /// The wrapped pipeline manager.
    pub fn manager(&self) -> &Arc<PipelineManager> {
        &self.manager
    }

    fn store(&self) -> &Arc<ConfigStore> {
        self.manager.store()
    }

    /// Start the pipeline and persist the running flag.
    ///
    /// On bind failure the flag is left untouched and the pipeline stays stopped.
    pub async fn start(&self) -> Result<PipelineStatus, Syslog2CefError> {
        let status = self.manager.start().await?;
        self.store().set_running(true).await?;
        tracing::info!("pipeline started by operator");
        Ok(status)
    }

    /// Stop the pipeline and clear the running flag.
    pub async fn stop(&self) -> Result<PipelineStatus, Syslog2CefError> {
        let status = self.manager.stop().await;
        self.store().set_running(false).await?;
        tracing::info!("pipeline stopped by operator");
        Ok(status)
    }

    /// Resume the pipeline if the persisted flag says so.
    ///
    /// Failures are logged by the manager and never propagated; the persisted
    /// flag is kept so a later boot retries.
    pub async fn resume(&self) -> PipelineStatus {
        self.manager.start_if_enabled().await
    }

    /// Current pipeline state.
    pub async fn status(&self) -> PipelineStatus {
        self.manager.status().await
    }

    /// Current configuration document.
    pub fn config(&self) -> Syslog2CefConfig {
        self.store().snapshot()
    }

    /// Apply and persist a configuration patch.
    ///
    /// A rejected patch leaves both the document and the pipeline untouched.
    pub async fn update_config(&self, patch: &ConfigPatch) -> Result<ConfigUpdate, Syslog2CefError> {
        let before = self.store().pipeline();
        let saved = self.store().update(patch).await?;
        let io_changed = saved.pipeline() != before;

        let status = if io_changed && saved.running {
            tracing::info!(
                input_protocol = %saved.input.protocol,
                input_port = saved.input.port,
                output_protocol = %saved.output.protocol,
                output_host = saved.output.host.as_str(),
                output_port = saved.output.port,
                "input/output changed, stopping pipeline until it is started again"
            );
            self.stop().await?
        } else {
            self.status().await
        };

        Ok(ConfigUpdate {
            config: self.store().snapshot(),
            io_changed,
            status,
        })
    }
}
