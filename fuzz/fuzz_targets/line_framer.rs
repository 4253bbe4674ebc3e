#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use syslog2cef_pipeline::LineFramer;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 연결에서 도착하는 청크 순서
    chunks: Vec<Vec<u8>>,
    /// 미완성 프레임 최대 크기 (0은 1로 보정)
    max_pending: u16,
}

fuzz_target!(|input: FuzzInput| {
    let mut framer = LineFramer::new(usize::from(input.max_pending.max(1)));

    for chunk in &input.chunks {
        for record in framer.push(chunk) {
            // 레코드는 trim 되어 있고 비어 있지 않으며 구분자를 포함하지 않는다
            assert!(!record.is_empty());
            assert_eq!(record.trim(), record);
            assert!(!record.contains('\n'));
        }
        if framer.check_pending().is_err() {
            break;
        }
    }

    let _ = framer.finish();
});
