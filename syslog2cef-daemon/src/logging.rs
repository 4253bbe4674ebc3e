//! Logging initialization for syslog2cef-daemon.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `Syslog2CefConfig`. `RUST_LOG` wins over the configured level.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use syslog2cef_core::config::GeneralConfig;

/// Apply CLI overrides on top of the `[general]` section.
pub fn apply_cli_overrides(
    config: &mut GeneralConfig,
    log_level: Option<&str>,
    log_format: Option<&str>,
) {
    if let Some(level) = log_level {
        config.log_level = level.to_owned();
    }
    if let Some(format) = log_format {
        config.log_format = format.to_owned();
    }
}

/// Build the level filter: `RUST_LOG` if set, otherwise `config.log_level`.
pub fn build_filter(config: &GeneralConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.log_level)
        .map_err(|e| anyhow::anyhow!("invalid log level '{}': {}", config.log_level, e))
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
///
/// # Formats
///
/// * `"json"` - JSON lines (default)
/// * `"pretty"` - multi-line human-readable output
/// * `"compact"` - single-line human-readable output
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json', 'pretty' or 'compact'",
                other
            ));
        }
    };

    result.map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}
