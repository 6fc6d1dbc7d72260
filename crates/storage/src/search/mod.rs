//! 검색 색인
//!
//! 보강 레코드를 검색 색인 문서([`IndexDocument`])로 바꾸어 색인하고,
//! 엔티티별 패싯 질의([`FacetQuery`])로 다운로드 분포를 얻습니다.
//!
//! - [`SearchIndex`]: 색인 추상화 (`add`, `query`)
//! - [`SolrIndex`]: Solr HTTP 구현
//! - [`IndexSink`]: [`BatchSink`] 어댑터 (배치 writer에서 사용)

pub mod solr;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use oastats_core::types::{AuthorRef, CountryCount, DateCount, EnrichedRecord};

use crate::error::StorageError;
use crate::writer::BatchSink;

pub use solr::SolrIndex;

/// 국가 패싯 최대 버킷 수
pub const COUNTRY_FACET_LIMIT: u32 = 250;

/// 날짜 패싯 간격
pub const DATE_FACET_GAP: &str = "+1DAY";

/// 검색 색인 문서
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub country: String,
    /// UTC, `Z` 접미사
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub dlc_display: Vec<String>,
    #[serde(default)]
    pub dlc_canonical: Vec<String>,
    #[serde(default)]
    pub author_id: Vec<String>,
    #[serde(default)]
    pub author_name: Vec<String>,
    /// `"<id>:<name>"`
    #[serde(default)]
    pub author: Vec<String>,
}

impl IndexDocument {
    /// 보강 레코드를 색인 문서로 변환합니다.
    ///
    /// 핸들이 없거나 시각을 해석할 수 없으면 에러입니다.
    pub fn from_record(record: &EnrichedRecord) -> Result<Self, StorageError> {
        let handle = record
            .handle
            .clone()
            .ok_or_else(|| StorageError::Query("record has no handle".to_owned()))?;
        let time = DateTime::parse_from_rfc3339(&record.time)
            .map_err(|e| StorageError::Query(format!("bad record time '{}': {e}", record.time)))?
            .with_timezone(&Utc)
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();

        Ok(Self {
            handle,
            title: record.title.clone(),
            country: record.country.clone(),
            time,
            dlc_display: record.dlcs.iter().map(|d| d.display_name.clone()).collect(),
            dlc_canonical: record.dlcs.iter().map(|d| d.canonical_name.clone()).collect(),
            author_id: record.authors.iter().map(|a| a.id.clone()).collect(),
            author_name: record.authors.iter().map(|a| a.name.clone()).collect(),
            author: record.authors.iter().map(join_author).collect(),
        })
    }

    /// `author` 필드에서 유효한 저자만 복원합니다.
    pub fn parents(&self) -> Vec<AuthorRef> {
        self.author.iter().filter_map(|a| split_author(a)).collect()
    }
}

/// 저자를 `"<id>:<name>"` 형태로 합칩니다. ID가 없으면 빈 문자열을 씁니다.
pub fn join_author(author: &AuthorRef) -> String {
    format!("{}:{}", author.id, author.name)
}

/// `"<id>:<name>"`를 저자로 나눕니다. 콜론이 없거나 ID가 비어 있으면 `None`.
pub fn split_author(value: &str) -> Option<AuthorRef> {
    let (id, name) = value.split_once(':')?;
    if id.is_empty() {
        return None;
    }
    Some(AuthorRef::new(id, name))
}

/// 패싯 질의 대상
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    Author(String),
    Dlc(String),
    Handle(String),
    Overall,
}

impl QueryTarget {
    /// Solr `q` 파라미터
    pub fn q(&self) -> String {
        match self {
            Self::Author(id) => format!("author_id:{}", quote(id)),
            Self::Dlc(canonical) => format!("dlc_canonical:{}", quote(canonical)),
            Self::Handle(handle) => format!("handle:{}", quote(handle)),
            Self::Overall => "*:*".to_owned(),
        }
    }

    /// 문서 단위 질의 여부 (그룹핑 대신 첫 문서를 받음)
    pub fn is_handle(&self) -> bool {
        matches!(self, Self::Handle(_))
    }
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// 패싯 질의
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetQuery {
    pub target: QueryTarget,
    /// 날짜 패싯 시작 (Solr 날짜 수식)
    pub facet_start: String,
    /// 날짜 패싯 끝 (Solr 날짜 수식, 예: `NOW`)
    pub facet_end: String,
}

impl FacetQuery {
    pub fn new(target: QueryTarget, facet_start: impl Into<String>, facet_end: impl Into<String>) -> Self {
        Self {
            target,
            facet_start: facet_start.into(),
            facet_end: facet_end.into(),
        }
    }

    /// Solr `select` 요청 파라미터
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("q", self.target.q()), ("wt", "json".to_owned())];
        if self.target.is_handle() {
            params.push(("rows", "1".to_owned()));
        } else {
            params.extend([
                ("rows", "0".to_owned()),
                ("group", "true".to_owned()),
                ("group.field", "handle".to_owned()),
                ("group.ngroups", "true".to_owned()),
            ]);
        }
        params.extend([
            ("facet", "true".to_owned()),
            ("facet.field", "country".to_owned()),
            ("f.country.facet.limit", COUNTRY_FACET_LIMIT.to_string()),
            ("facet.range", "time".to_owned()),
            ("facet.range.start", self.facet_start.clone()),
            ("facet.range.end", self.facet_end.clone()),
            ("facet.range.gap", DATE_FACET_GAP.to_owned()),
        ]);
        params
    }
}

/// 패싯 질의 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetResult {
    /// 일치한 레코드 수 (다운로드 수)
    pub matches: u64,
    /// 서로 다른 핸들 수 (그룹 질의에서만 의미 있음)
    pub ngroups: u64,
    pub countries: Vec<CountryCount>,
    pub dates: Vec<DateCount>,
    /// 첫 문서 (핸들 질의에서만 채워짐)
    pub first: Option<IndexDocument>,
}

/// `[값, 개수, 값, 개수, ...]` 형태의 패싯 배열을 `(값, 개수)` 목록으로 바꿉니다.
///
/// 짝이 맞지 않는 마지막 원소는 버립니다.
pub fn facet_pairs(flat: &[Value]) -> Result<Vec<(String, u64)>, StorageError> {
    flat.chunks_exact(2)
        .map(|pair| {
            let value = pair[0]
                .as_str()
                .ok_or_else(|| StorageError::Query(format!("facet value is not a string: {}", pair[0])))?;
            let count = pair[1]
                .as_u64()
                .ok_or_else(|| StorageError::Query(format!("facet count is not a number: {}", pair[1])))?;
            Ok((value.to_owned(), count))
        })
        .collect()
}

/// 국가 패싯 배열을 국가별 다운로드 수로 변환합니다.
pub fn country_counts(flat: &[Value]) -> Result<Vec<CountryCount>, StorageError> {
    Ok(facet_pairs(flat)?
        .into_iter()
        .map(|(country, downloads)| CountryCount { country, downloads })
        .collect())
}

/// 날짜 범위 패싯 배열을 일자별 다운로드 수로 변환합니다. 날짜는 `YYYY-MM-DD`로 자릅니다.
pub fn date_counts(flat: &[Value]) -> Result<Vec<DateCount>, StorageError> {
    Ok(facet_pairs(flat)?
        .into_iter()
        .map(|(date, downloads)| DateCount {
            date: date.chars().take(10).collect(),
            downloads,
        })
        .collect())
}

/// 검색 색인 추상화
pub trait SearchIndex: Send + Sync {
    /// 문서를 색인하고 커밋합니다.
    fn add(&self, docs: &[IndexDocument]) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// 패싯 질의를 실행합니다.
    fn query(&self, query: &FacetQuery) -> impl Future<Output = Result<FacetResult, StorageError>> + Send;
}

/// 검색 색인을 배치 싱크로 감싸는 어댑터
pub struct IndexSink<'a, I> {
    index: &'a I,
}

impl<'a, I: SearchIndex> IndexSink<'a, I> {
    pub fn new(index: &'a I) -> Self {
        Self { index }
    }
}

impl<I: SearchIndex> BatchSink<IndexDocument> for IndexSink<'_, I> {
    async fn send_batch(&mut self, batch: &[IndexDocument]) -> Result<(), StorageError> {
        self.index.add(batch).await
    }

    fn name(&self) -> &'static str {
        "search"
    }
}

#[cfg(test)]
pub use memory::MemorySearchIndex;

#[cfg(test)]
mod memory {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    use super::*;

    /// 메모리 기반 테스트용 색인
    ///
    /// 날짜 범위는 무시하고 문서가 있는 날만 버킷으로 돌려줍니다.
    #[derive(Default)]
    pub struct MemorySearchIndex {
        docs: Mutex<Vec<IndexDocument>>,
        failing_targets: Vec<QueryTarget>,
    }

    impl MemorySearchIndex {
        pub fn new() -> Self {
            Self::default()
        }

        /// 지정한 대상의 질의를 실패시킵니다.
        pub fn failing_on(mut self, target: QueryTarget) -> Self {
            self.failing_targets.push(target);
            self
        }

        pub fn len(&self) -> usize {
            self.docs.lock().map(|d| d.len()).unwrap_or(0)
        }

        fn matches(target: &QueryTarget, doc: &IndexDocument) -> bool {
            match target {
                QueryTarget::Author(id) => doc.author_id.contains(id),
                QueryTarget::Dlc(canonical) => doc.dlc_canonical.contains(canonical),
                QueryTarget::Handle(handle) => &doc.handle == handle,
                QueryTarget::Overall => true,
            }
        }
    }

    impl SearchIndex for MemorySearchIndex {
        async fn add(&self, docs: &[IndexDocument]) -> Result<(), StorageError> {
            self.docs
                .lock()
                .map_err(|_| StorageError::Query("index lock poisoned".to_owned()))?
                .extend_from_slice(docs);
            Ok(())
        }

        async fn query(&self, query: &FacetQuery) -> Result<FacetResult, StorageError> {
            if self.failing_targets.contains(&query.target) {
                return Err(StorageError::Search {
                    status: 500,
                    reason: format!("forced failure for {}", query.target.q()),
                });
            }

            let docs = self
                .docs
                .lock()
                .map_err(|_| StorageError::Query("index lock poisoned".to_owned()))?;
            let hits: Vec<&IndexDocument> = docs
                .iter()
                .filter(|d| Self::matches(&query.target, d))
                .collect();

            let mut countries: BTreeMap<&str, u64> = BTreeMap::new();
            let mut dates: BTreeMap<&str, u64> = BTreeMap::new();
            for doc in &hits {
                *countries.entry(doc.country.as_str()).or_default() += 1;
                *dates.entry(&doc.time[..10.min(doc.time.len())]).or_default() += 1;
            }
            let mut countries: Vec<CountryCount> = countries
                .into_iter()
                .map(|(c, n)| CountryCount {
                    country: c.to_owned(),
                    downloads: n,
                })
                .collect();
            countries.sort_by(|a, b| b.downloads.cmp(&a.downloads));

            Ok(FacetResult {
                matches: hits.len() as u64,
                ngroups: hits.iter().map(|d| &d.handle).collect::<HashSet<_>>().len() as u64,
                countries,
                dates: dates
                    .into_iter()
                    .map(|(d, n)| DateCount {
                        date: d.to_owned(),
                        downloads: n,
                    })
                    .collect(),
                first: if query.target.is_handle() {
                    hits.first().map(|d| (*d).clone())
                } else {
                    None
                },
            })
        }
    }
}
