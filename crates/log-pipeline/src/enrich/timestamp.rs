//! 타임스탬프 변환

use chrono::DateTime;

/// Apache 접근 로그 타임스탬프 형식 (`31/Jan/2013:23:58:51 -0500`)
pub const APACHE_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Apache 타임스탬프를 원래 오프셋을 유지한 ISO-8601 문자열로 변환합니다.
///
/// 파싱할 수 없으면 `None`을 반환합니다. 호출자는 해당 레코드를 경고와 함께 버립니다.
pub fn to_iso8601(raw: &str) -> Option<String> {
    DateTime::parse_from_str(raw.trim(), APACHE_TIME_FORMAT)
        .ok()
        .map(|dt| dt.to_rfc3339())
}
