//! 설정 관리 — syslog2cef.toml 파싱, 정규화, 검증
//!
//! [`Syslog2CefConfig`]는 데몬 전체 설정을 담는 최상위 구조체입니다.
//! 파이프라인은 이 중 입력/출력 부분만 [`PipelineConfig`] 스냅샷으로 읽습니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SYSLOG2CEF_INPUT_PORT=1514` 형식)
//! 3. 설정 파일 (`syslog2cef.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 부분 업데이트
//! 외부 협력자(UI 등)는 [`ConfigPatch`]로 일부 필드만 바꿀 수 있습니다.
//! [`Syslog2CefConfig::normalize`]가 패치를 현재 값 위에 병합하고
//! 검증까지 끝낸 완전한 설정을 돌려주므로, 하위 코드는 부분 설정을 다루지 않습니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), syslog2cef_core::error::Syslog2CefError> {
//! use syslog2cef_core::config::Syslog2CefConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = Syslog2CefConfig::load("syslog2cef.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = Syslog2CefConfig::parse("[input]\nprotocol = \"tcp\"")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, Syslog2CefError};

/// TCP 프레이밍 버퍼 상한 (16 MiB)
const MAX_MESSAGE_SIZE_LIMIT: usize = 16 * 1024 * 1024;

/// 전송 프로토콜 (입력/출력 공통)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// 비연결형 데이터그램
    #[default]
    Udp,
    /// 연결형 스트림
    Tcp,
}

impl Protocol {
    /// 소문자 이름 (`udp`, `tcp`) — CEF `deviceInboundInterface` 값으로 사용
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }

    /// 대문자 이름 (`UDP`, `TCP`) — 샘플의 `from` 태그에 사용
    pub fn as_upper(&self) -> &'static str {
        match self {
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(ConfigError::invalid(
                "protocol",
                format!("'{other}' is not one of: udp, tcp"),
            )),
        }
    }
}

/// Syslog2CEF 통합 설정
///
/// `syslog2cef.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Syslog2CefConfig {
    /// 파이프라인이 실행 중이어야 하는지 (재시작 시 자동 재개 판단에 사용)
    #[serde(default)]
    pub running: bool,
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// syslog 입력 설정
    #[serde(default)]
    pub input: InputConfig,
    /// CEF 출력 설정
    #[serde(default)]
    pub output: OutputConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Syslog2CefConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Syslog2CefError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, Syslog2CefError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Syslog2CefError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                Syslog2CefError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, Syslog2CefError> {
        toml::from_str(toml_str).map_err(|e| {
            Syslog2CefError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// TOML 문자열로 직렬화합니다.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeFailed {
            reason: e.to_string(),
        })
    }

    /// 파이프라인이 읽는 입력/출력 스냅샷을 반환합니다.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            input: self.input.clone(),
            output: self.output.clone(),
        }
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SYSLOG2CEF_{SECTION}_{FIELD}`
    /// 예: `SYSLOG2CEF_OUTPUT_HOST=siem.local`
    pub fn apply_env_overrides(&mut self) {
        override_bool(&mut self.running, "SYSLOG2CEF_RUNNING");

        // General
        override_string(&mut self.general.log_level, "SYSLOG2CEF_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SYSLOG2CEF_GENERAL_LOG_FORMAT");

        // Input
        override_protocol(&mut self.input.protocol, "SYSLOG2CEF_INPUT_PROTOCOL");
        override_string(&mut self.input.address, "SYSLOG2CEF_INPUT_ADDRESS");
        override_u16(&mut self.input.port, "SYSLOG2CEF_INPUT_PORT");
        override_usize(
            &mut self.input.max_message_size,
            "SYSLOG2CEF_INPUT_MAX_MESSAGE_SIZE",
        );
        override_usize(
            &mut self.input.max_connections,
            "SYSLOG2CEF_INPUT_MAX_CONNECTIONS",
        );
        override_usize(
            &mut self.input.recv_buffer_size,
            "SYSLOG2CEF_INPUT_RECV_BUFFER_SIZE",
        );

        // Output
        override_protocol(&mut self.output.protocol, "SYSLOG2CEF_OUTPUT_PROTOCOL");
        override_string(&mut self.output.host, "SYSLOG2CEF_OUTPUT_HOST");
        override_u16(&mut self.output.port, "SYSLOG2CEF_OUTPUT_PORT");

        // Metrics
        override_bool(&mut self.metrics.enabled, "SYSLOG2CEF_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "SYSLOG2CEF_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "SYSLOG2CEF_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty", "compact"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.pipeline().validate()?;

        if self.metrics.enabled {
            validate_port("metrics.port", u32::from(self.metrics.port))?;
            if self.metrics.listen_addr.parse::<IpAddr>().is_err() {
                return Err(ConfigError::invalid(
                    "metrics.listen_addr",
                    format!("'{}' is not an IP address", self.metrics.listen_addr),
                ));
            }
        }

        Ok(())
    }

    /// 패치를 현재 설정 위에 병합하고 검증된 완전한 설정을 반환합니다.
    ///
    /// 현재 값(`self`)은 변경하지 않습니다. 어느 필드라도 유효하지 않으면
    /// 해당 필드 이름을 담은 [`ConfigError::InvalidValue`]를 반환합니다.
    pub fn normalize(&self, patch: &ConfigPatch) -> Result<Self, ConfigError> {
        let mut merged = self.clone();

        if let Some(running) = patch.running {
            merged.running = running;
        }

        if let Some(input) = &patch.input {
            if let Some(protocol) = &input.protocol {
                merged.input.protocol = parse_protocol("input.protocol", protocol)?;
            }
            if let Some(address) = &input.address {
                merged.input.address = address.trim().to_owned();
            }
            if let Some(port) = input.port {
                merged.input.port = validate_port("input.port", port)?;
            }
        }

        if let Some(output) = &patch.output {
            if let Some(protocol) = &output.protocol {
                merged.output.protocol = parse_protocol("output.protocol", protocol)?;
            }
            if let Some(host) = &output.host {
                merged.output.host = host.trim().to_owned();
            }
            if let Some(port) = output.port {
                merged.output.port = validate_port("output.port", port)?;
            }
        }

        merged.validate()?;
        Ok(merged)
    }
}

/// 파이프라인이 매 동작마다 새로 읽는 입력/출력 설정 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 입력 설정
    pub input: InputConfig,
    /// 출력 설정
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// 입력/출력 설정을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_port("input.port", u32::from(self.input.port))?;
        validate_port("output.port", u32::from(self.output.port))?;

        if self.input.address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::invalid(
                "input.address",
                format!("'{}' is not an IP address", self.input.address),
            ));
        }

        if self.input.max_message_size == 0 || self.input.max_message_size > MAX_MESSAGE_SIZE_LIMIT
        {
            return Err(ConfigError::invalid(
                "input.max_message_size",
                format!("must be 1-{MAX_MESSAGE_SIZE_LIMIT}"),
            ));
        }

        if self.input.max_connections == 0 || self.input.max_connections > usize::from(u16::MAX) {
            return Err(ConfigError::invalid(
                "input.max_connections",
                format!("must be 1-{}", u16::MAX),
            ));
        }

        if self.input.recv_buffer_size == 0 || self.input.recv_buffer_size > usize::from(u16::MAX)
        {
            return Err(ConfigError::invalid(
                "input.recv_buffer_size",
                format!("must be 1-{}", u16::MAX),
            ));
        }

        if !is_valid_host(&self.output.host) {
            return Err(ConfigError::invalid(
                "output.host",
                format!("'{}' is not a valid IP address or hostname", self.output.host),
            ));
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty, compact)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// syslog 입력 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// 수신 프로토콜
    pub protocol: Protocol,
    /// 바인드 주소 (기본값: 모든 인터페이스)
    pub address: String,
    /// 수신 포트
    pub port: u16,
    /// TCP 연결당 미완성 레코드 최대 크기 (바이트)
    pub max_message_size: usize,
    /// TCP 최대 동시 연결 수
    pub max_connections: usize,
    /// UDP 데이터그램 수신 버퍼 크기 (바이트)
    pub recv_buffer_size: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Udp,
            address: "0.0.0.0".to_owned(),
            port: 1514,
            max_message_size: 1024 * 1024, // 1MB
            max_connections: 256,
            recv_buffer_size: 65535,
        }
    }
}

/// CEF 출력 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 전송 프로토콜
    pub protocol: Protocol,
    /// 수신 측 호스트 (IP 또는 호스트명)
    pub host: String,
    /// 수신 측 포트
    pub port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Udp,
            host: "127.0.0.1".to_owned(),
            port: 5514,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// 부분 설정 패치
///
/// 모든 필드가 선택적입니다. 포트는 범위 밖 값을 타입 에러가 아닌
/// 검증 에러로 보고하기 위해 `u32`로 받습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    /// 실행 플래그
    pub running: Option<bool>,
    /// 입력 패치
    pub input: Option<InputPatch>,
    /// 출력 패치
    pub output: Option<OutputPatch>,
}

/// 입력 설정 패치
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPatch {
    pub protocol: Option<String>,
    pub address: Option<String>,
    pub port: Option<u32>,
}

/// 출력 설정 패치
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPatch {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u32>,
}

// --- 검증 헬퍼 ---

fn validate_port(field: &str, port: u32) -> Result<u16, ConfigError> {
    match u16::try_from(port) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(ConfigError::invalid(field, "must be 1-65535")),
    }
}

fn parse_protocol(field: &str, value: &str) -> Result<Protocol, ConfigError> {
    value.parse::<Protocol>().map_err(|_| {
        ConfigError::invalid(field, format!("'{value}' is not one of: udp, tcp"))
    })
}

/// 출력 호스트가 IP 리터럴 또는 RFC 1123 호스트명인지 확인합니다.
pub fn is_valid_host(host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() {
        return false;
    }
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    if host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_protocol(target: &mut Protocol, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<Protocol>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse protocol from env var, ignoring"
            ),
        }
    }
}
