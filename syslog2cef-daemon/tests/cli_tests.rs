//! CLI flag handling tests.

use clap::Parser;
use syslog2cef_core::config::GeneralConfig;
use syslog2cef_daemon::cli::DaemonCli;
use syslog2cef_daemon::logging::apply_cli_overrides;

#[test]
fn test_log_flags_override_config_section() {
    // Given: CLI flags for level and format
    let cli = DaemonCli::try_parse_from([
        "syslog2cef-daemon",
        "--log-level",
        "trace",
        "--log-format",
        "pretty",
    ])
    .unwrap();

    // When: Applying them to the [general] section
    let mut general = GeneralConfig::default();
    apply_cli_overrides(&mut general, cli.log_level.as_deref(), cli.log_format.as_deref());

    // Then: Both values come from the CLI
    assert_eq!(general.log_level, "trace");
    assert_eq!(general.log_format, "pretty");
}

#[test]
fn test_validate_flag() {
    let cli = DaemonCli::try_parse_from(["syslog2cef-daemon", "--validate", "--config", "a.toml"])
        .unwrap();
    assert!(cli.validate);
    assert_eq!(cli.config.to_str(), Some("a.toml"));
}
