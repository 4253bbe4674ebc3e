//! Prometheus metrics endpoint.
//!
//! Installs the global `metrics` recorder backed by the HTTP listener of
//! `metrics-exporter-prometheus`. Every `counter!`/`gauge!` call in the
//! pipeline crates is recorded once this has run.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use syslog2cef_core::config::MetricsConfig;

/// Only path served by the built-in listener.
const SUPPORTED_ENDPOINT: &str = "/metrics";

/// Resolve the socket address the exporter should listen on.
pub fn listen_address(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != SUPPORTED_ENDPOINT {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '{}' is served",
            config.endpoint,
            SUPPORTED_ENDPOINT
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Install the global metrics recorder and start the HTTP listener.
///
/// Call at most once per process.
///
/// # Errors
///
/// - unsupported endpoint or unparsable address
/// - socket bind failure
/// - a global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_address(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    syslog2cef_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}
