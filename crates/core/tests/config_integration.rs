//! syslog2cef.toml 통합 설정 테스트
//!
//! - syslog2cef.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - ConfigStore 파일 영속화 테스트

use syslog2cef_core::config::{ConfigPatch, InputPatch, Protocol, Syslog2CefConfig};
use syslog2cef_core::error::{ConfigError, Syslog2CefError};
use syslog2cef_core::store::ConfigStore;

// =============================================================================
// syslog2cef.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../syslog2cef.toml.example");
    let config = Syslog2CefConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../syslog2cef.toml.example");
    let config = Syslog2CefConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../syslog2cef.toml.example");
    let config = Syslog2CefConfig::parse(content).expect("should parse");
    assert_eq!(config, Syslog2CefConfig::default());
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_output_only() {
    let toml = r#"
[output]
protocol = "tcp"
host = "siem.example.com"
"#;
    let config = Syslog2CefConfig::parse(toml).expect("should parse");
    assert_eq!(config.output.protocol, Protocol::Tcp);
    assert_eq!(config.output.host, "siem.example.com");
    assert_eq!(config.output.port, 5514);
    assert_eq!(config.input.port, 1514);
    config.validate().expect("should validate");
}

#[test]
fn partial_config_out_of_range_fails_validation() {
    let toml = r#"
[input]
max_message_size = 0
"#;
    let config = Syslog2CefConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "input.max_message_size"));
}

#[test]
fn port_overflow_is_parse_error() {
    let toml = r#"
[input]
port = 70000
"#;
    let err = Syslog2CefConfig::parse(toml).unwrap_err();
    assert!(matches!(
        err,
        Syslog2CefError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[output]
host = "10.0.0.1"
"#;

    let original = std::env::var("SYSLOG2CEF_OUTPUT_HOST").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("SYSLOG2CEF_OUTPUT_HOST", "siem.local");
    }

    let mut config = Syslog2CefConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.output.host.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("SYSLOG2CEF_OUTPUT_HOST", val),
            None => std::env::remove_var("SYSLOG2CEF_OUTPUT_HOST"),
        }
    }

    assert_eq!(result, "siem.local");
}

#[test]
#[serial_test::serial]
fn env_override_invalid_protocol_is_ignored() {
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("SYSLOG2CEF_OUTPUT_PROTOCOL", "carrier-pigeon");
    }

    let mut config = Syslog2CefConfig::default();
    config.apply_env_overrides();

    // SAFETY: 테스트 정리
    unsafe {
        std::env::remove_var("SYSLOG2CEF_OUTPUT_PROTOCOL");
    }

    assert_eq!(config.output.protocol, Protocol::Udp);
}

// =============================================================================
// ConfigStore 영속화 테스트
// =============================================================================

#[tokio::test]
#[serial_test::serial]
async fn store_open_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("syslog2cef.toml");

    let store = ConfigStore::open(&path).await.expect("should open");
    assert_eq!(store.snapshot(), Syslog2CefConfig::default());
    // 첫 쓰기 전에는 파일을 만들지 않음
    assert!(!path.exists());
}

#[tokio::test]
#[serial_test::serial]
async fn store_open_invalid_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("syslog2cef.toml");
    std::fs::write(&path, "running = [[[").unwrap();

    let err = ConfigStore::open(&path).await.unwrap_err();
    assert!(matches!(
        err,
        Syslog2CefError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn store_update_persists_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("syslog2cef.toml");

    // Given: 기본 설정 저장소
    let store = ConfigStore::open(&path).await.unwrap();

    // When: 입력 설정을 변경하고 실행 플래그를 켠다
    let patch = ConfigPatch {
        input: Some(InputPatch {
            protocol: Some("tcp".to_owned()),
            port: Some(6514),
            ..Default::default()
        }),
        ..Default::default()
    };
    store.update(&patch).await.unwrap();
    store.set_running(true).await.unwrap();

    // Then: 새 저장소로 다시 열어도 변경 사항이 유지된다
    let reopened = ConfigStore::open(&path).await.unwrap();
    let config = reopened.snapshot();
    assert!(config.running);
    assert_eq!(config.input.protocol, Protocol::Tcp);
    assert_eq!(config.input.port, 6514);

    // 임시 파일은 남지 않음
    assert!(!dir.path().join("syslog2cef.toml.tmp").exists());
}

#[tokio::test]
#[serial_test::serial]
async fn store_rejected_update_does_not_touch_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("syslog2cef.toml");
    let store = ConfigStore::open(&path).await.unwrap();
    store.set_running(true).await.unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let patch = ConfigPatch {
        input: Some(InputPatch {
            protocol: Some("sctp".to_owned()),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert!(store.update(&patch).await.is_err());

    let after = std::fs::read_to_string(&path).unwrap();
    assert_eq!(before, after);
}
