//! 샘플 이벤트 — 번역된 레코드 하나를 관찰자에게 전달하는 단위
//!
//! [`Sample`]은 인바운드 레코드마다 한 번 생성되며 불변입니다.
//! 영속화되지 않고 샘플 버스의 publish 호출 동안에만 존재합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 번역 결과 샘플
///
/// `when`은 RFC 3339 문자열로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// 수신한 원본 텍스트
    pub raw: String,
    /// 번역된 CEF 라인
    pub cef: String,
    /// 샘플 생성 시각 (UTC)
    pub when: DateTime<Utc>,
    /// 송신 측 식별자 (`"UDP 10.0.0.1:5140"` 형식)
    pub from: String,
}

impl Sample {
    /// 현재 시각으로 새 샘플을 생성합니다.
    pub fn new(raw: impl Into<String>, cef: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            cef: cef.into(),
            when: Utc::now(),
            from: from.into(),
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} -> {}", self.from, self.raw, self.cef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_new_sets_fields() {
        let sample = Sample::new("<13>hello", "CEF:0|...", "UDP 127.0.0.1:5000");
        assert_eq!(sample.raw, "<13>hello");
        assert_eq!(sample.cef, "CEF:0|...");
        assert_eq!(sample.from, "UDP 127.0.0.1:5000");
    }

    #[test]
    fn sample_serializes_when_as_iso8601() {
        let sample = Sample::new("raw", "cef", "TCP 127.0.0.1:9000");
        let json = serde_json::to_value(&sample).unwrap();
        let when = json["when"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(when).is_ok());
        assert_eq!(json["from"], "TCP 127.0.0.1:9000");
    }

    #[test]
    fn sample_display_contains_source() {
        let sample = Sample::new("raw", "cef", "UDP 10.0.0.1:514");
        let display = sample.to_string();
        assert!(display.contains("UDP 10.0.0.1:514"));
        assert!(display.contains("raw"));
    }
}
