//! 접근 로그 라인 파서
//!
//! Apache combined 형식 중 문서 배포 경로(`/openaccess-disseminate/<handle>`)에 대한
//! 요청만을 고정 문법으로 인식합니다.
//!
//! # 라인 형식
//! ```text
//! <client-ip> <logname> <user> [<timestamp>] "<METHOD> <path> <version>" <status> <bytes> "<referer>" "<user-agent>"
//! ```
//!
//! 문법에 맞지 않는 라인은 에러가 아니라 `Ok(None)`입니다 (관심 대상이 아닌 라인).
//! 문법에는 맞지만 클라이언트 IP가 유효한 주소가 아닌 라인만
//! [`LogPipelineError::MalformedLine`]으로 보고됩니다.
//!
//! # 사용 예시
//! ```
//! use oastats_log_pipeline::parser::LineParser;
//!
//! let parser = LineParser::new().unwrap();
//! let line = r#"1.2.3.4 - - [31/Jan/2013:23:58:51 -0500] "GET /openaccess-disseminate/1721.1/22774 HTTP/1.1" 200 6865 "-" "Mozilla/5.0""#;
//! let record = parser.parse(line).unwrap().unwrap();
//! assert_eq!(record.request, "/openaccess-disseminate/1721.1/22774");
//! ```

use std::net::IpAddr;

use regex::{Captures, Regex};

use crate::error::LogPipelineError;

/// 배포 경로 접두어
pub const DISSEMINATE_PREFIX: &str = "/openaccess-disseminate/";

const LINE_PATTERN: &str = concat!(
    r#"^(?P<remote_host>\S+) (?P<logname>\S+) (?P<user>\S+) \[(?P<time>[^\]]*)\] "#,
    r#""(?P<method>\S+) (?P<path>/openaccess-disseminate/\d+(?:\.\d+)*/\d+(?:\?\S*)?) (?P<version>\S+)" "#,
    r#"(?P<status>\S+) (?P<bytes>\S+) "(?P<referer>.*?)" "(?P<user_agent>.*)"$"#,
);

/// 캡처 그룹 이름 -> 출력 필드 이름
///
/// 여기에 없는 캡처(`logname`, `user`)는 버려집니다.
const FIELD_MAP: &[(&str, &str)] = &[
    ("remote_host", "ip_address"),
    ("time", "time"),
    ("method", "method"),
    ("path", "request"),
    ("version", "http_version"),
    ("status", "status"),
    ("bytes", "bytes"),
    ("referer", "referer"),
    ("user_agent", "user_agent"),
];

/// 문법에 맞는 라인 하나에서 추출한 필드
///
/// 문법에 정확히 일치한 라인에서만 만들어지며, 없는 필드를 임의로 채우지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    /// 클라이언트 IP (유효성 검증됨)
    pub ip_address: String,
    /// 대괄호 안의 원본 타임스탬프
    pub time: String,
    /// HTTP 메서드
    pub method: String,
    /// 정규화된 요청 경로 (경로 + 쿼리)
    pub request: String,
    /// HTTP 버전
    pub http_version: String,
    /// 상태 코드 (원본 문자열)
    pub status: String,
    /// 바이트 수 (원본 문자열)
    pub bytes: String,
    /// Referer
    pub referer: String,
    /// User-Agent
    pub user_agent: String,
}

impl ParsedRecord {
    /// 요청 경로에서 문서 핸들(`<prefix>/<number>`)을 추출합니다.
    pub fn handle(&self) -> Option<&str> {
        extract_handle(&self.request)
    }

    fn from_fields(fields: Vec<(&'static str, String)>) -> Option<Self> {
        let mut record = Self {
            ip_address: String::new(),
            time: String::new(),
            method: String::new(),
            request: String::new(),
            http_version: String::new(),
            status: String::new(),
            bytes: String::new(),
            referer: String::new(),
            user_agent: String::new(),
        };
        let mut seen = 0;
        for (key, value) in fields {
            let slot = match key {
                "ip_address" => &mut record.ip_address,
                "time" => &mut record.time,
                "method" => &mut record.method,
                "request" => &mut record.request,
                "http_version" => &mut record.http_version,
                "status" => &mut record.status,
                "bytes" => &mut record.bytes,
                "referer" => &mut record.referer,
                "user_agent" => &mut record.user_agent,
                _ => continue,
            };
            *slot = value;
            seen += 1;
        }
        (seen == FIELD_MAP.len()).then_some(record)
    }
}

/// 고정 문법 라인 파서
pub struct LineParser {
    pattern: Regex,
}

impl LineParser {
    /// 라인 문법을 컴파일하여 새 파서를 생성합니다.
    pub fn new() -> Result<Self, LogPipelineError> {
        Ok(Self {
            pattern: Regex::new(LINE_PATTERN)?,
        })
    }

    /// 라인 하나를 파싱합니다.
    ///
    /// - 문법 불일치: `Ok(None)`
    /// - 문법 일치, 잘못된 클라이언트 IP: `Err(MalformedLine)`
    pub fn parse(&self, line: &str) -> Result<Option<ParsedRecord>, LogPipelineError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(caps) = self.pattern.captures(line) else {
            return Ok(None);
        };

        let fields = map_fields(&caps);
        let Some(record) = ParsedRecord::from_fields(fields) else {
            return Ok(None);
        };

        if record.ip_address.parse::<IpAddr>().is_err() {
            return Err(LogPipelineError::MalformedLine {
                reason: format!("invalid client ip '{}'", record.ip_address),
            });
        }

        Ok(Some(record))
    }
}

/// 캡처 그룹을 출력 필드 이름으로 바꾸고 매핑에 없는 캡처는 버립니다.
fn map_fields(caps: &Captures<'_>) -> Vec<(&'static str, String)> {
    FIELD_MAP
        .iter()
        .filter_map(|(group, key)| caps.name(group).map(|m| (*key, m.as_str().to_owned())))
        .collect()
}

/// 요청 경로에서 핸들을 추출합니다.
///
/// `/openaccess-disseminate/1721.1/22774?x=1` -> `1721.1/22774`
pub fn extract_handle(request: &str) -> Option<&str> {
    let rest = request.strip_prefix(DISSEMINATE_PREFIX)?;
    let handle = rest.split(['?', '#']).next().unwrap_or(rest);
    let (prefix, number) = handle.split_once('/')?;
    let prefix_ok = !prefix.is_empty()
        && prefix
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    let number_ok = !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit());
    (prefix_ok && number_ok).then_some(handle)
}
