//! Daemon orchestration -- assembly, boot, sample feed and shutdown.
//!
//! The [`Orchestrator`] owns the config store, the sample bus, the pipeline
//! manager and the [`BridgeService`] wrapping it.
//!
//! # Boot
//!
//! 1. Open the config store (missing file -> defaults)
//! 2. Install the metrics recorder if enabled
//! 3. Subscribe the sample feed
//! 4. Resume the pipeline if the persisted flag is on (or force a start)
//! 5. Spawn the uptime task
//!
//! # Shutdown
//!
//! On SIGTERM/SIGINT the background tasks are signalled first, then the
//! pipeline is stopped. The persisted running flag is left as-is so the
//! next boot resumes the pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use syslog2cef_core::config::Syslog2CefConfig;
use syslog2cef_core::event::Sample;
use syslog2cef_core::store::ConfigStore;
use syslog2cef_pipeline::{PipelineManager, PipelineStatus, SampleBus};

use crate::health::{DaemonHealth, PipelineHealth, overall_status};
use crate::metrics_server;
use crate::service::BridgeService;

/// Buffered samples for the feed task before samples are dropped.
const SAMPLE_FEED_CAPACITY: usize = 256;

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_SECS: u64 = 10;

/// Boot-time behaviour selected on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Start the pipeline even if the persisted flag is off.
    pub force_start: bool,
    /// Print samples to stdout as JSON lines instead of debug logs.
    pub print_samples: bool,
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Lifecycle service (owns the pipeline manager).
    service: BridgeService,
    /// Boot options.
    options: RunOptions,
    /// Whether the metrics recorder was installed.
    metrics_enabled: bool,
    /// Shutdown broadcast for background tasks.
    shutdown_tx: broadcast::Sender<()>,
    /// Background task handles.
    tasks: Vec<JoinHandle<()>>,
    /// Orchestrator creation time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Open the config store at `config_path` and build the orchestrator.
    ///
    /// # Errors
    ///
    /// - the file exists but cannot be parsed or fails validation
    /// - the metrics recorder cannot be installed
    pub async fn build(config_path: &Path, options: RunOptions) -> Result<Self> {
        let store = ConfigStore::open(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_store(Arc::new(store), options)
    }

    /// Build from an already-opened store.
    pub fn build_from_store(store: Arc<ConfigStore>, options: RunOptions) -> Result<Self> {
        let config = store.snapshot();
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let manager = Arc::new(PipelineManager::new(store, SampleBus::new()));
        let (shutdown_tx, _) = broadcast::channel(4);

        tracing::info!(
            running = config.running,
            input_protocol = %config.input.protocol,
            input_port = config.input.port,
            output_protocol = %config.output.protocol,
            output_host = config.output.host.as_str(),
            output_port = config.output.port,
            "orchestrator initialized"
        );

        Ok(Self {
            service: BridgeService::new(manager),
            options,
            metrics_enabled: config.metrics.enabled,
            shutdown_tx,
            tasks: Vec::new(),
            start_time: Instant::now(),
        })
    }

    /// Boot, run until a shutdown signal arrives, then shut down.
    pub async fn run(&mut self) -> Result<()> {
        self.boot().await?;

        tracing::info!("syslog2cef-daemon running");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        self.shutdown().await;
        Ok(())
    }

    /// Spawn background tasks and start the pipeline (resume or forced).
    ///
    /// The sample feed is subscribed before the listener is bound so no early
    /// record is missed. A failed resume is not an error; a failed forced
    /// start is.
    pub async fn boot(&mut self) -> Result<PipelineStatus> {
        let (_, samples) = self
            .service
            .manager()
            .sample_bus()
            .subscribe_channel(SAMPLE_FEED_CAPACITY);
        self.tasks.push(spawn_sample_feed(
            samples,
            self.options.print_samples,
            self.shutdown_tx.subscribe(),
        ));

        let status = if self.options.force_start {
            self.service
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start pipeline: {}", e))?
        } else {
            self.service.resume().await
        };

        if self.metrics_enabled {
            self.tasks.push(spawn_uptime_updater(
                self.start_time,
                self.shutdown_tx.subscribe(),
            ));
        }

        tracing::info!(running = status.running, "boot complete");
        Ok(status)
    }

    /// Stop background tasks and the pipeline, keeping the persisted flag.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }

        self.service.manager().stop().await;
        tracing::info!("syslog2cef-daemon shut down");
    }

    /// Current health report.
    pub async fn health(&self) -> DaemonHealth {
        let pipeline = PipelineHealth::collect(self.service.manager()).await;
        let uptime_secs = self.start_time.elapsed().as_secs();

        if self.metrics_enabled {
            use syslog2cef_core::metrics as m;
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: overall_status(&pipeline),
            uptime_secs,
            pipeline,
        }
    }

    /// The lifecycle service.
    pub fn service(&self) -> &BridgeService {
        &self.service
    }

    /// Current configuration document.
    pub fn config(&self) -> Syslog2CefConfig {
        self.service.config()
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Render a sample as a single JSON line.
pub fn sample_json_line(sample: &Sample) -> Result<String> {
    serde_json::to_string(sample).map_err(|e| anyhow::anyhow!("failed to encode sample: {}", e))
}

/// Spawn the task that reports translated samples.
fn spawn_sample_feed(
    mut samples: mpsc::Receiver<Sample>,
    print: bool,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                sample = samples.recv() => {
                    let Some(sample) = sample else {
                        tracing::debug!("sample bus closed, exiting feed");
                        break;
                    };
                    if print {
                        match sample_json_line(&sample) {
                            Ok(line) => println!("{line}"),
                            Err(e) => tracing::warn!(error = %e, "dropping sample"),
                        }
                    } else {
                        tracing::debug!(
                            from = sample.from.as_str(),
                            raw = sample.raw.as_str(),
                            cef = sample.cef.as_str(),
                            "sample"
                        );
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("sample feed shutting down");
                    break;
                }
            }
        }
    })
}

/// Spawn the task that keeps the uptime gauge fresh.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    use syslog2cef_core::metrics as m;

    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(UPTIME_UPDATE_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
