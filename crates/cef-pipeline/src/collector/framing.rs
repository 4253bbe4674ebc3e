//! 개행 프레이밍 상태 머신
//!
//! TCP 연결마다 하나의 [`LineFramer`]가 수신 바이트를 누적하고, 구분자(`\n`)가
//! 나타날 때마다 하나의 레코드를 잘라냅니다. 소켓과 분리되어 있어
//! 네트워크 없이 단위 테스트할 수 있습니다.
//!
//! - 레코드는 구분자 앞까지의 내용을 trim 한 문자열입니다.
//! - trim 결과가 비어 있으면 버립니다.
//! - 구분자가 없는 꼬리 바이트는 다음 청크를 기다립니다. 연결이 닫히면
//!   레코드로 만들지 않고 버립니다.
//! - 바이트 단위로 누적하므로 멀티바이트 UTF-8 문자가 청크 경계에서
//!   잘려도 레코드 단위로 올바르게 복원됩니다.

use bytes::BytesMut;
use metrics::counter;
use syslog2cef_core::metrics as m;

use crate::error::PipelineError;

/// 레코드 구분자
pub const RECORD_SEPARATOR: u8 = b'\n';

/// 연결별 개행 프레이머
#[derive(Debug)]
pub struct LineFramer {
    /// 아직 구분자를 만나지 않은 바이트
    buffer: BytesMut,
    /// 구분자가 없음을 이미 확인한 `buffer` 앞부분 길이
    scanned: usize,
    /// 미완성 레코드 최대 크기
    max_pending: usize,
}

impl LineFramer {
    /// 새 프레이머를 생성합니다.
    pub fn new(max_pending: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_pending,
        }
    }

    /// 청크를 추가하고 완성된 레코드를 순서대로 반환합니다.
    ///
    /// 새로 들어온 바이트만 검색하므로 잘게 나뉜 긴 레코드도 선형 시간에
    /// 처리됩니다.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..]
            .iter()
            .position(|b| *b == RECORD_SEPARATOR)
        {
            let pos = self.scanned + offset;
            self.scanned = 0;
            let frame = self.buffer.split_to(pos + 1);
            let text = String::from_utf8_lossy(&frame[..pos]);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                counter!(m::RECORDS_EMPTY_DROPPED_TOTAL).increment(1);
                continue;
            }
            records.push(trimmed.to_owned());
        }
        self.scanned = self.buffer.len();
        records
    }

    /// 미완성 레코드가 허용 크기를 넘었는지 확인합니다.
    ///
    /// 에러가 반환되면 호출자는 연결을 닫아야 합니다.
    pub fn check_pending(&self) -> Result<(), PipelineError> {
        if self.buffer.len() > self.max_pending {
            return Err(PipelineError::FrameTooLarge {
                size: self.buffer.len(),
                max: self.max_pending,
            });
        }
        Ok(())
    }

    /// 구분자를 기다리는 바이트 수
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// 연결 종료 시 호출합니다. 버려진 미완성 바이트 수를 반환합니다.
    pub fn finish(mut self) -> usize {
        let discarded = self.buffer.len();
        if discarded > 0 {
            counter!(m::FRAMES_DISCARDED_TOTAL).increment(1);
        }
        self.buffer.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_complete_record() {
        let mut framer = LineFramer::new(1024);
        assert_eq!(framer.push(b"<13>hello world\n"), vec!["<13>hello world"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn partial_record_waits_for_separator() {
        let mut framer = LineFramer::new(1024);
        assert!(framer.push(b"<13>hel").is_empty());
        assert_eq!(framer.pending(), 7);
        assert_eq!(framer.push(b"lo\n"), vec!["<13>hello"]);
    }

    #[test]
    fn multiple_records_in_one_chunk() {
        let mut framer = LineFramer::new(1024);
        let records = framer.push(b"one\ntwo\nthr");
        assert_eq!(records, vec!["one", "two"]);
        assert_eq!(framer.push(b"ee\n"), vec!["three"]);
    }

    #[test]
    fn records_are_trimmed_and_empty_ones_dropped() {
        let mut framer = LineFramer::new(1024);
        let records = framer.push(b"  padded \r\n\n   \n\tlast\t\n");
        assert_eq!(records, vec!["padded", "last"]);
    }

    #[test]
    fn utf8_split_across_chunks() {
        let mut framer = LineFramer::new(1024);
        let text = "héllo\n".as_bytes();
        // 'é'는 2바이트, 중간에서 자름
        assert!(framer.push(&text[..2]).is_empty());
        assert_eq!(framer.push(&text[2..]), vec!["héllo"]);
    }

    #[test]
    fn finish_discards_unterminated_fragment() {
        let mut framer = LineFramer::new(1024);
        assert!(framer.push(b"no newline here").is_empty());
        assert_eq!(framer.finish(), 15);
    }

    #[test]
    fn finish_on_empty_buffer() {
        let framer = LineFramer::new(1024);
        assert_eq!(framer.finish(), 0);
    }

    #[test]
    fn oversized_pending_fragment_is_rejected() {
        let mut framer = LineFramer::new(8);
        assert!(framer.push(b"12345678").is_empty());
        assert!(framer.check_pending().is_ok());
        assert!(framer.push(b"9").is_empty());
        let err = framer.check_pending().unwrap_err();
        assert!(matches!(err, PipelineError::FrameTooLarge { size: 9, max: 8 }));
    }

    #[test]
    fn complete_records_do_not_count_toward_limit() {
        let mut framer = LineFramer::new(4);
        let records = framer.push(b"a long completed record\nab");
        assert_eq!(records, vec!["a long completed record"]);
        assert!(framer.check_pending().is_ok());
    }

    #[test]
    fn long_record_in_small_chunks_is_scanned_once() {
        let mut framer = LineFramer::new(2 * 1024 * 1024);
        let chunk = [b'x'; 100];

        let started = std::time::Instant::now();
        for _ in 0..10_000 {
            assert!(framer.push(&chunk).is_empty());
        }
        assert!(
            started.elapsed() < std::time::Duration::from_secs(5),
            "chunked push took {:?}",
            started.elapsed()
        );
        assert_eq!(framer.pending(), 1_000_000);
        assert!(framer.check_pending().is_ok());

        let records = framer.push(b" tail\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), 1_000_005);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn separator_after_partial_scan_is_found() {
        let mut framer = LineFramer::new(1024);
        assert!(framer.push(b"abc").is_empty());
        assert!(framer.push(b"def").is_empty());
        assert_eq!(framer.push(b"\nghi\nj"), vec!["abcdef", "ghi"]);
        assert_eq!(framer.push(b"k\n"), vec!["jk"]);
    }

    proptest! {
        #[test]
        fn framing_roundtrip(
            segments in proptest::collection::vec("[a-zA-Z0-9 <>=:.]{0,40}", 0..20),
            split_points in proptest::collection::vec(0usize..2000, 0..10),
        ) {
            let mut stream = Vec::new();
            for seg in &segments {
                stream.extend_from_slice(seg.as_bytes());
                stream.push(RECORD_SEPARATOR);
            }

            let mut cuts: Vec<usize> = split_points
                .into_iter()
                .map(|p| if stream.is_empty() { 0 } else { p % stream.len() })
                .collect();
            cuts.push(0);
            cuts.push(stream.len());
            cuts.sort_unstable();
            cuts.dedup();

            let mut framer = LineFramer::new(usize::MAX);
            let mut records = Vec::new();
            for window in cuts.windows(2) {
                records.extend(framer.push(&stream[window[0]..window[1]]));
            }

            let expected: Vec<String> = segments
                .iter()
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
            prop_assert_eq!(records, expected);
            prop_assert_eq!(framer.pending(), 0);
        }
    }
}
