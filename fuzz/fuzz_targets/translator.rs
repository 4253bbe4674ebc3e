#![no_main]

use arbitrary::Arbitrary;
use chrono::{DateTime, Utc};
use libfuzzer_sys::fuzz_target;

use syslog2cef_core::config::Protocol;
use syslog2cef_pipeline::translator::{CEF_HEADER_PREFIX, translate_at};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    raw: String,
    tcp: bool,
    /// 주입할 현재 시각 (초)
    now_secs: u32,
}

fuzz_target!(|input: FuzzInput| {
    let protocol = if input.tcp { Protocol::Tcp } else { Protocol::Udp };
    let now = DateTime::<Utc>::from_timestamp(i64::from(input.now_secs), 0)
        .unwrap_or_else(Utc::now);

    // 어떤 입력이든 패닉 없이 한 줄의 CEF 레코드를 만들어야 한다
    let cef = translate_at(&input.raw, protocol, now);
    assert!(cef.starts_with(CEF_HEADER_PREFIX));
    assert!(cef.contains(&format!(" deviceInboundInterface={} cs1=", protocol.as_str())));
});
