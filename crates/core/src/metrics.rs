//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `syslog2cef_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(syslog2cef_core::metrics::RECORDS_FORWARDED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 프로토콜 레이블 키 (udp, tcp)
pub const LABEL_PROTOCOL: &str = "protocol";

// ─── 인바운드 메트릭 ───────────────────────────────────────────────

/// 수신한 레코드 수 (counter, label: protocol)
pub const RECORDS_RECEIVED_TOTAL: &str = "syslog2cef_records_received_total";

/// 공백뿐이라 버려진 TCP 레코드 수 (counter)
pub const RECORDS_EMPTY_DROPPED_TOTAL: &str = "syslog2cef_records_empty_dropped_total";

/// 크기 초과 또는 연결 종료로 버려진 미완성 프레임 수 (counter)
pub const FRAMES_DISCARDED_TOTAL: &str = "syslog2cef_frames_discarded_total";

/// 현재 열린 TCP 클라이언트 연결 수 (gauge)
pub const TCP_CONNECTIONS_ACTIVE: &str = "syslog2cef_tcp_connections_active";

// ─── 아웃바운드 메트릭 ─────────────────────────────────────────────

/// 전송에 성공한 CEF 레코드 수 (counter, label: protocol)
pub const RECORDS_FORWARDED_TOTAL: &str = "syslog2cef_records_forwarded_total";

/// 전송 실패 수 (counter, label: protocol)
pub const FORWARD_ERRORS_TOTAL: &str = "syslog2cef_forward_errors_total";

// ─── 샘플 버스 / 라이프사이클 ──────────────────────────────────────

/// 발행된 샘플 수 (counter)
pub const SAMPLES_PUBLISHED_TOTAL: &str = "syslog2cef_samples_published_total";

/// 파이프라인 실행 여부 (gauge, 1 = running)
pub const PIPELINE_RUNNING: &str = "syslog2cef_pipeline_running";

/// 데몬 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "syslog2cef_daemon_uptime_seconds";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `syslog2cef-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Inbound
    describe_counter!(
        RECORDS_RECEIVED_TOTAL,
        "Total number of inbound syslog records received"
    );
    describe_counter!(
        RECORDS_EMPTY_DROPPED_TOTAL,
        "Total number of whitespace-only TCP records dropped"
    );
    describe_counter!(
        FRAMES_DISCARDED_TOTAL,
        "Total number of unterminated or oversized TCP fragments discarded"
    );
    describe_gauge!(
        TCP_CONNECTIONS_ACTIVE,
        "Number of TCP syslog client connections currently open"
    );

    // Outbound
    describe_counter!(
        RECORDS_FORWARDED_TOTAL,
        "Total number of CEF records sent to the downstream collector"
    );
    describe_counter!(
        FORWARD_ERRORS_TOTAL,
        "Total number of failed CEF forward attempts"
    );

    // Sample bus / lifecycle
    describe_counter!(
        SAMPLES_PUBLISHED_TOTAL,
        "Total number of samples published to observers"
    );
    describe_gauge!(PIPELINE_RUNNING, "1 when the pipeline is running, 0 otherwise");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Syslog2CEF daemon uptime in seconds");
}
