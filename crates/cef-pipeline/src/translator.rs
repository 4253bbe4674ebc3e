//! Syslog → CEF 번역기
//!
//! 관대한(best-effort) 휴리스틱으로 PRI, 타임스탬프, 호스트명, 메시지를 분리한 뒤
//! 한 줄의 CEF 레코드를 만듭니다. 번역은 실패하지 않습니다. 해석할 수 없는
//! 부분은 정의된 기본값(`unknown` 호스트, 현재 시각)으로 대체됩니다.
//!
//! # 분류 규칙 (첫 번째로 맞는 규칙 적용)
//! 1. 토큰 3개 이상, 첫 토큰이 날짜 → `timestamp=tok[0]`, `hostname=tok[1]`
//! 2. 토큰 3개 이상, 앞 3토큰을 이은 문자열이 날짜 → `timestamp=tok[0..3]`,
//!    `hostname=tok[3]` (없으면 `unknown`)
//! 3. 토큰 3개 이상 → `hostname=tok[0]`, 타임스탬프는 현재 시각
//! 4. 토큰 3개 미만 → `hostname=unknown`, 메시지는 PRI 뒤 전체
//!
//! 날짜 판별은 같은 토큰이 호스트명처럼 보여도 날짜로 해석되면 날짜로 분류합니다.
//! 이 순서는 관찰 가능한 동작이므로 바꾸지 않습니다.
//!
//! # 출력 형식
//! ```text
//! CEF:0|Custom|Syslog2CEF|1.0|syslog-134|Translated syslog|0|msg=... shost=... rt=... deviceInboundInterface=udp cs1=... cs2Label=user cs2=alice
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use syslog2cef_core::config::Protocol;

/// CEF 헤더 고정부 (버전, 벤더, 제품, 제품 버전)
pub const CEF_HEADER_PREFIX: &str = "CEF:0|Custom|Syslog2CEF|1.0|";

/// CEF 이벤트 이름
const CEF_EVENT_NAME: &str = "Translated syslog";

/// CEF 심각도
const CEF_SEVERITY: u8 = 0;

/// 호스트명을 알 수 없을 때 사용하는 값
const UNKNOWN_HOST: &str = "unknown";

/// 메시지에서 추출하는 key=value 쌍의 최대 개수 (cs2..cs6)
const MAX_CUSTOM_PAIRS: usize = 5;

/// 첫 번째 사용자 정의 필드 인덱스 (cs1은 원문 보관용)
const FIRST_CUSTOM_INDEX: usize = 2;

/// 시각과 함께 나타나는 타임스탬프 형식 (타임존 없음 → UTC로 간주)
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// 날짜만 있는 형식 (자정 UTC로 간주)
const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// `word=nonwhitespace` 패턴
static KV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9_]+)=(\S+)").expect("key=value pattern is a valid regex")
});

/// 휴리스틱으로 분리한 syslog 구성 요소
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogParts {
    /// `<N>` 접두사의 N (없으면 None)
    pub pri: Option<String>,
    /// 타임스탬프로 분류된 원문 (None이면 현재 시각 사용)
    pub timestamp: Option<String>,
    /// 호스트명
    pub hostname: String,
    /// 헤더를 제외한 메시지
    pub message: String,
    /// PRI를 제거하고 trim 한 전체 본문 (`cs1`로 보관)
    pub body: String,
}

impl SyslogParts {
    /// 원본 텍스트를 구성 요소로 분리합니다.
    ///
    /// `now`는 연도가 없는 BSD 타임스탬프(`Aug 26 12:34:56`)의 연도를 채우는 데 쓰입니다.
    pub fn parse(raw: &str, now: DateTime<Utc>) -> Self {
        let (pri, rest) = strip_pri(raw);
        let body = rest.trim();
        let tokens: Vec<&str> = body.split_whitespace().collect();

        let (timestamp, hostname, message) = if tokens.len() >= 3 {
            if parse_timestamp(tokens[0], now).is_some() {
                (
                    Some(tokens[0].to_owned()),
                    tokens[1].to_owned(),
                    tokens[2..].join(" "),
                )
            } else {
                let first_three = tokens[..3].join(" ");
                if parse_timestamp(&first_three, now).is_some() {
                    let hostname = tokens.get(3).copied().unwrap_or(UNKNOWN_HOST);
                    let message = tokens.get(4..).map(|t| t.join(" ")).unwrap_or_default();
                    (Some(first_three), hostname.to_owned(), message)
                } else {
                    (None, tokens[0].to_owned(), tokens[1..].join(" "))
                }
            }
        } else {
            (None, UNKNOWN_HOST.to_owned(), body.to_owned())
        };

        Self {
            pri: pri.map(str::to_owned),
            timestamp,
            hostname,
            message,
            body: body.to_owned(),
        }
    }

    /// CEF signature ID (`syslog-N` 또는 `syslog`)
    pub fn signature(&self) -> String {
        match &self.pri {
            Some(pri) => format!("syslog-{pri}"),
            None => "syslog".to_owned(),
        }
    }

    /// `rt` 필드 시각. 타임스탬프를 해석할 수 없으면 `now`를 반환합니다.
    pub fn received_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.timestamp
            .as_deref()
            .and_then(|ts| parse_timestamp(ts, now))
            .unwrap_or(now)
    }

    /// 메시지에서 최대 5개의 key=value 쌍을 등장 순서대로 추출합니다.
    pub fn custom_pairs(&self) -> Vec<(&str, &str)> {
        KV_PATTERN
            .captures_iter(&self.message)
            .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
            .take(MAX_CUSTOM_PAIRS)
            .collect()
    }
}

/// 현재 시각 기준으로 syslog 텍스트를 CEF 라인으로 번역합니다.
pub fn translate(raw: &str, inbound: Protocol) -> String {
    translate_at(raw, inbound, Utc::now())
}

/// 주어진 시각을 "현재"로 사용해 번역합니다.
///
/// 같은 입력과 같은 `now`에 대해 항상 같은 결과를 반환합니다.
pub fn translate_at(raw: &str, inbound: Protocol, now: DateTime<Utc>) -> String {
    let parts = SyslogParts::parse(raw, now);

    let mut extensions = vec![
        format!("msg={}", escape_extension_value(&parts.message)),
        format!("shost={}", escape_extension_value(&parts.hostname)),
        format!("rt={}", parts.received_at(now).timestamp_millis()),
        format!(
            "deviceInboundInterface={}",
            escape_extension_value(inbound.as_str())
        ),
        format!("cs1={}", escape_extension_value(&parts.body)),
    ];

    for (offset, (label, value)) in parts.custom_pairs().into_iter().enumerate() {
        let index = FIRST_CUSTOM_INDEX + offset;
        extensions.push(format!("cs{index}Label={}", escape_extension_value(label)));
        extensions.push(format!("cs{index}={}", escape_extension_value(value)));
    }

    format!(
        "{CEF_HEADER_PREFIX}{}|{CEF_EVENT_NAME}|{CEF_SEVERITY}|{}",
        parts.signature(),
        extensions.join(" ")
    )
}

/// CEF 확장 필드 값 이스케이프: `\` → `\\`, `=` → `\=`
pub fn escape_extension_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('=', "\\=")
}

/// 인식 가능한 형식이면 UTC 시각으로 해석합니다.
///
/// 지원 형식: RFC 3339, RFC 2822, `YYYY-MM-DDTHH:MM:SS[.f]`,
/// `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DD`, `YYYY/MM/DD`, `MM/DD/YYYY`,
/// BSD `Mon DD HH:MM:SS` (`now`의 연도 사용).
pub fn parse_timestamp(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    parse_bsd_timestamp(text, now.year())
}

/// BSD 타임스탬프 (`Aug 26 12:34:56`)에 연도를 붙여 해석합니다.
fn parse_bsd_timestamp(text: &str, year: i32) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(&format!("{year} {text}"), "%Y %b %d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// 선두의 `<digits>` 접두사를 분리합니다. 형식이 맞지 않으면 원문을 그대로 둡니다.
fn strip_pri(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix('<') else {
        return (None, raw);
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, raw);
    }
    match rest[digits..].strip_prefix('>') {
        Some(body) => (Some(&rest[..digits]), body),
        None => (None, raw),
    }
}
