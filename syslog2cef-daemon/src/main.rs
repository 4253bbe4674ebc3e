use anyhow::Result;
use clap::Parser;

use syslog2cef_core::config::Syslog2CefConfig;
use syslog2cef_core::store::ConfigStore;
use syslog2cef_daemon::cli::DaemonCli;
use syslog2cef_daemon::logging;
use syslog2cef_daemon::orchestrator::{Orchestrator, RunOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    if cli.validate {
        let config = Syslog2CefConfig::load(&cli.config)
            .await
            .map_err(|e| anyhow::anyhow!("{}: {}", cli.config.display(), e))?;
        println!(
            "{}: configuration is valid ({} {}:{} -> {} {}:{})",
            cli.config.display(),
            config.input.protocol,
            config.input.address,
            config.input.port,
            config.output.protocol,
            config.output.host,
            config.output.port,
        );
        return Ok(());
    }

    let store = ConfigStore::open(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;

    let mut general = store.snapshot().general;
    logging::apply_cli_overrides(
        &mut general,
        cli.log_level.as_deref(),
        cli.log_format.as_deref(),
    );
    logging::init_tracing(&general)?;

    tracing::info!(
        config = %cli.config.display(),
        version = env!("CARGO_PKG_VERSION"),
        "syslog2cef-daemon starting"
    );

    let options = RunOptions {
        force_start: cli.start,
        print_samples: cli.print_samples,
    };
    let mut orchestrator = Orchestrator::build_from_store(std::sync::Arc::new(store), options)?;
    orchestrator.run().await
}
