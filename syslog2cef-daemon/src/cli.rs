//! CLI argument definitions for syslog2cef-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// syslog → CEF translation daemon.
///
/// Receives syslog over UDP or TCP, translates every record to a single
/// CEF line and forwards it to a downstream collector.
#[derive(Parser, Debug)]
#[command(name = "syslog2cef-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to the syslog2cef.toml configuration document.
    ///
    /// The file is created on the first persisted change if it does not exist.
    #[arg(short, long, default_value = "/etc/syslog2cef/syslog2cef.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// `RUST_LOG` still takes precedence when set.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty, compact).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate the configuration file and exit.
    #[arg(long)]
    pub validate: bool,

    /// Start the pipeline on boot even if the persisted running flag is off.
    ///
    /// The flag is persisted as on after a successful start.
    #[arg(long)]
    pub start: bool,

    /// Print every translated sample to stdout as a JSON line.
    #[arg(long)]
    pub print_samples: bool,
}
