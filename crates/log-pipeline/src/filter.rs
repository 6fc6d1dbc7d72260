//! 레코드 필터 체인
//!
//! 각 필터는 레코드가 살아남는지 판정하는 술어이며, 체인은 첫 번째 실패에서 멈춥니다.
//! 탈락은 에러가 아니라 [`FilterKind`]로 보고되어 스킵 사유 집계에 사용됩니다.
//!
//! 파이프라인은 비용이 싼 텍스트 필터(메서드, 날짜, 클라이언트 IP)를 파싱 전에
//! 원시 라인에 적용하고, 나머지(상태 코드, 경로, 봇)는 파싱된 레코드에 적용합니다.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;

use crate::error::LogPipelineError;
use crate::parser::{ParsedRecord, extract_handle};

/// 알려진 봇 클라이언트 이름 접두어 (대소문자 무시)
pub const BOT_PREFIXES: &[&str] = &[
    "java",
    "python",
    "libwww",
    "lwp-trivial",
    "htdig",
    "xenu",
    "tineye",
    "yacy",
    "pycurl",
    "linkwalker",
    "ocelli",
];

/// 봇임을 나타내는 부분 문자열 (대소문자 무시)
pub const BOT_SUBSTRINGS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "findlinks",
    "feedfetcher",
    "slurp",
    "sensis",
    "jeeves",
    "nutch",
    "harvest",
    "larbin",
    "archiver",
    "ichiro",
    "scrubby",
    "silk",
    "referee",
    "webcollage",
    "store",
];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// 레코드를 탈락시킨 필터 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// 상태 코드가 문자열 `"200"`이 아님
    Status,
    /// 메서드가 `GET`이 아님
    Method,
    /// 경로가 배포 핸들 형태가 아님
    Path,
    /// 제외 대상 클라이언트 IP
    ClientIp,
    /// 봇 User-Agent
    Bot,
    /// 대상 월에 속하지 않음
    Date,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Method => "method",
            Self::Path => "path",
            Self::ClientIp => "client_ip",
            Self::Bot => "bot",
            Self::Date => "date",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 대상 연-월 (`Mon/YYYY`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetMonth(String);

impl TargetMonth {
    /// `Mon/YYYY` 또는 `Mon-YYYY` 형식을 받아 `Mon/YYYY`로 정규화합니다.
    ///
    /// 월 이름은 대소문자를 구분하지 않습니다 (`jan-2013` -> `Jan/2013`).
    pub fn parse(value: &str) -> Result<Self, LogPipelineError> {
        let invalid = || LogPipelineError::Config {
            field: "month".to_owned(),
            reason: format!("expected Mon/YYYY or Mon-YYYY, got '{value}'"),
        };

        let (month, year) = value
            .trim()
            .split_once(['/', '-'])
            .ok_or_else(invalid)?;
        let month = MONTHS
            .iter()
            .find(|m| m.eq_ignore_ascii_case(month))
            .ok_or_else(invalid)?;
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        Ok(Self(format!("{month}/{year}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 순서가 고정된 필터 체인
pub struct FilterChain {
    excluded_ips: HashSet<String>,
    months: Vec<TargetMonth>,
    bot_pattern: Regex,
}

impl FilterChain {
    /// 제외 IP 목록과 대상 월 목록으로 체인을 구성합니다.
    ///
    /// 대상 월이 비어 있으면 날짜 필터는 모든 레코드를 통과시킵니다.
    pub fn new<I, S>(excluded_ips: I, months: Vec<TargetMonth>) -> Result<Self, LogPipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            excluded_ips: excluded_ips.into_iter().map(Into::into).collect(),
            months,
            bot_pattern: Regex::new(&bot_pattern())?,
        })
    }

    /// 대상 월 목록
    pub fn months(&self) -> &[TargetMonth] {
        &self.months
    }

    /// 파싱 전 원시 라인에 적용하는 필터 (메서드 -> 날짜 -> 클라이언트 IP)
    pub fn reject_line(&self, line: &str) -> Option<FilterKind> {
        if !line_is_get(line) {
            return Some(FilterKind::Method);
        }
        if !self.months.is_empty() {
            match bracketed_timestamp(line) {
                Some(ts) if self.in_target_month(ts) => {}
                _ => return Some(FilterKind::Date),
            }
        }
        let client = line.split_whitespace().next().unwrap_or_default();
        if self.excluded_ips.contains(client) {
            return Some(FilterKind::ClientIp);
        }
        None
    }

    /// 파싱 후 레코드에 적용하는 필터 (상태 코드 -> 경로 -> 봇)
    pub fn reject_parsed(&self, record: &ParsedRecord) -> Option<FilterKind> {
        if record.status != "200" {
            return Some(FilterKind::Status);
        }
        if extract_handle(&record.request).is_none() {
            return Some(FilterKind::Path);
        }
        if self.is_bot(&record.user_agent) {
            return Some(FilterKind::Bot);
        }
        None
    }

    /// 봇 User-Agent 여부
    pub fn is_bot(&self, user_agent: &str) -> bool {
        self.bot_pattern.is_match(user_agent)
    }

    fn in_target_month(&self, timestamp: &str) -> bool {
        self.months.iter().any(|m| timestamp.contains(m.as_str()))
    }
}

/// 접두어는 시작 위치에, 부분 문자열은 어디서든 대소문자 무시로 매칭
fn bot_pattern() -> String {
    let join = |items: &[&str]| {
        items
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|")
    };
    format!(
        "(?i)^(?:{})|(?:{})",
        join(BOT_PREFIXES),
        join(BOT_SUBSTRINGS)
    )
}

/// 요청 필드(첫 번째 큰따옴표 뒤)가 `GET `으로 시작하는지 확인합니다.
fn line_is_get(line: &str) -> bool {
    line.split_once('"')
        .is_some_and(|(_, request)| request.starts_with("GET "))
}

/// 첫 번째 `[...]` 안의 타임스탬프
fn bracketed_timestamp(line: &str) -> Option<&str> {
    let start = line.find('[')? + 1;
    let len = line[start..].find(']')?;
    Some(&line[start..start + len])
}
