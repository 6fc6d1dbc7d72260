//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 파이프라인이 만들어 내는 보강 레코드와, 요약 단계가 만들어 내는
//! 요약 객체를 정의합니다. 저장소와 검색 색인은 이 타입들을 그대로 주고받습니다.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 저자 참조
///
/// 식별 서비스 응답의 `{mitid, name}` 객체에 대응합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorRef {
    /// 외부 저자 식별자
    #[serde(rename = "mitid", default, deserialize_with = "null_as_empty")]
    pub id: String,
    /// 저자 이름
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
}

impl AuthorRef {
    /// 새 저자 참조를 생성합니다.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// 식별자와 이름이 모두 비어 있지 않은지 여부
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}

impl fmt::Display for AuthorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// 부서(DLC) 참조
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Department {
    /// 정규화된 부서명 (자연 키)
    #[serde(rename = "canonical", default, deserialize_with = "null_as_empty")]
    pub canonical_name: String,
    /// 표시용 부서명
    #[serde(rename = "display", default, deserialize_with = "null_as_empty")]
    pub display_name: String,
}

impl Department {
    /// 새 부서 참조를 생성합니다.
    pub fn new(canonical: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            canonical_name: canonical.into(),
            display_name: display.into(),
        }
    }

    /// 정규화명과 표시명이 모두 비어 있지 않은지 여부
    pub fn is_valid(&self) -> bool {
        !self.canonical_name.is_empty() && !self.display_name.is_empty()
    }
}

/// 보강된 접근 레코드
///
/// 필터를 통과한 라인 하나당 한 번 생성되며, 이후 변경되지 않고
/// 정확히 하나의 writer로 전달됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// 클라이언트 IP
    pub ip_address: String,
    /// 원래 UTC 오프셋을 유지한 ISO-8601 시각
    pub time: String,
    /// HTTP 메서드
    pub method: String,
    /// 정규화된 요청 경로 (경로 + 쿼리)
    pub request: String,
    /// HTTP 버전
    pub http_version: String,
    /// 상태 코드 (문자열 그대로)
    pub status: String,
    /// 응답 바이트 수 (문자열 그대로, `-` 가능)
    pub bytes: String,
    /// Referer 헤더
    pub referer: String,
    /// User-Agent 헤더
    pub user_agent: String,
    /// ISO alpha-3 국가 코드 또는 `XXX`
    pub country: String,
    /// 문서 핸들
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// 문서 제목
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 소속 부서 목록
    #[serde(default)]
    pub dlcs: Vec<Department>,
    /// 저자 목록 (식별 서비스 응답의 첫 번째 저자 그룹)
    #[serde(default)]
    pub authors: Vec<AuthorRef>,
}

impl fmt::Display for EnrichedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} country={}",
            self.time, self.ip_address, self.request, self.country,
        )
    }
}

/// 요약 대상 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SummaryId {
    /// 저자
    Author { mitid: String, name: String },
    /// 부서
    Department { canonical: String, display: String },
    /// 문서
    Document { handle: String },
    /// 전체
    Overall,
}

impl SummaryId {
    /// 요약 문서의 `type` 값
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Author { .. } => "author",
            Self::Department { .. } => "dlc",
            Self::Document { .. } => "handle",
            Self::Overall => "overall",
        }
    }

    /// 요약 컬렉션의 기본 키
    ///
    /// 종류별로 네임스페이스가 분리되어 서로 다른 종류의 같은 값이 충돌하지 않습니다.
    pub fn key(&self) -> String {
        match self {
            Self::Author { mitid, .. } => format!("author:{mitid}"),
            Self::Department { canonical, .. } => format!("dlc:{canonical}"),
            Self::Document { handle } => format!("handle:{handle}"),
            Self::Overall => "overall".to_owned(),
        }
    }

    fn id_value(&self) -> serde_json::Value {
        match self {
            Self::Author { mitid, name } => serde_json::json!({ "mitid": mitid, "name": name }),
            Self::Department { canonical, display } => {
                serde_json::json!({ "canonical": canonical, "display": display })
            }
            Self::Document { handle } => serde_json::Value::String(handle.clone()),
            Self::Overall => serde_json::Value::String("overall".to_owned()),
        }
    }
}

impl fmt::Display for SummaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// 국가별 다운로드 수
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryCount {
    pub country: String,
    pub downloads: u64,
}

/// 일자별 다운로드 수 (`YYYY-MM-DD`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateCount {
    pub date: String,
    pub downloads: u64,
}

/// 요약 객체
///
/// 요약 실행마다 통째로 다시 만들어지며 점진적으로 갱신되지 않습니다.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryObject {
    /// 요약 대상
    pub id: SummaryId,
    /// 고유 문서 수
    pub size: u64,
    /// 전체 다운로드 수
    pub downloads: u64,
    /// 국가별 분포
    pub countries: Vec<CountryCount>,
    /// 일자별 분포
    pub dates: Vec<DateCount>,
    /// 문서 제목 (문서 요약에만 존재)
    pub title: Option<String>,
    /// 문서 저자 (문서 요약에만 존재)
    pub parents: Vec<AuthorRef>,
}

impl SummaryObject {
    /// 분포가 비어 있는 요약 객체를 생성합니다.
    pub fn new(id: SummaryId) -> Self {
        Self {
            id,
            size: 0,
            downloads: 0,
            countries: Vec::new(),
            dates: Vec::new(),
            title: None,
            parents: Vec::new(),
        }
    }
}

impl Serialize for SummaryObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let is_document = matches!(self.id, SummaryId::Document { .. });
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("_id", &self.id.id_value())?;
        map.serialize_entry("type", self.id.kind())?;
        if is_document {
            map.serialize_entry("title", &self.title)?;
            map.serialize_entry("parents", &self.parents)?;
        } else {
            map.serialize_entry("size", &self.size)?;
        }
        map.serialize_entry("downloads", &self.downloads)?;
        map.serialize_entry("countries", &self.countries)?;
        map.serialize_entry("dates", &self.dates)?;
        map.end()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
