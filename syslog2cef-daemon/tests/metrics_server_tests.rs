//! Integration tests for the metrics endpoint.

use syslog2cef_core::config::MetricsConfig;
use syslog2cef_daemon::metrics_server;

fn config(listen_addr: &str, port: u16, endpoint: &str) -> MetricsConfig {
    MetricsConfig {
        enabled: true,
        listen_addr: listen_addr.to_owned(),
        port,
        endpoint: endpoint.to_owned(),
    }
}

#[test]
fn test_listen_address_from_config() {
    let addr = metrics_server::listen_address(&config("127.0.0.1", 19100, "/metrics")).unwrap();
    assert_eq!(addr.to_string(), "127.0.0.1:19100");
}

#[test]
fn test_listen_address_rejects_invalid_ip() {
    // Given: An invalid IP
    let result = metrics_server::listen_address(&config("999.999.999.999", 9100, "/metrics"));

    // Then: Should fail
    assert!(result.is_err());
}

#[test]
fn test_unsupported_endpoint_is_rejected() {
    let result = metrics_server::install_metrics_recorder(&config("127.0.0.1", 19101, "/custom"));
    let err = result.expect_err("custom endpoint should be rejected");
    assert!(err.to_string().contains("unsupported metrics endpoint"));
}

#[tokio::test]
async fn test_install_metrics_recorder_succeeds_once() {
    // Given: A free loopback port
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    // When: Installing the recorder
    let result = metrics_server::install_metrics_recorder(&config("127.0.0.1", port, "/metrics"));

    // Then: Should succeed
    assert!(result.is_ok(), "install should succeed: {:?}", result.err());
}
