//! Solr 검색 색인 클라이언트
//!
//! - 색인: `POST {base}/update?commit=true` (JSON 배열 본문)
//! - 질의: `GET {base}/select` ([`FacetQuery::params`] 파라미터)

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::StorageError;

use super::{FacetQuery, FacetResult, IndexDocument, SearchIndex, country_counts, date_counts};

/// 에러 응답 본문을 메시지에 담을 최대 길이
const MAX_ERROR_BODY: usize = 512;

/// Solr 코어 하나에 대한 클라이언트
#[derive(Clone)]
pub struct SolrIndex {
    client: reqwest::Client,
    base_url: String,
}

impl SolrIndex {
    /// 코어 URL(예: `http://localhost:8983/solr/oastats`)로 클라이언트를 생성합니다.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut reason = response.text().await.unwrap_or_default();
        if reason.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|&i| reason.is_char_boundary(i))
                .unwrap_or(0);
            reason.truncate(cut);
        }
        Err(StorageError::Search {
            status: status.as_u16(),
            reason,
        })
    }
}

impl SearchIndex for SolrIndex {
    async fn add(&self, docs: &[IndexDocument]) -> Result<(), StorageError> {
        if docs.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(format!("{}/update", self.base_url))
            .query(&[("commit", "true")])
            .json(docs)
            .send()
            .await?;
        Self::check(response).await?;
        debug!(docs = docs.len(), "documents indexed");
        Ok(())
    }

    async fn query(&self, query: &FacetQuery) -> Result<FacetResult, StorageError> {
        let response = self
            .client
            .get(format!("{}/select", self.base_url))
            .query(&query.params())
            .send()
            .await?;
        let body: SelectResponse = Self::check(response).await?.json().await?;
        body.into_result(query.target.is_handle())
    }
}

/// `select` 응답 중 필요한 부분
#[derive(Debug, Default, Deserialize)]
struct SelectResponse {
    #[serde(default)]
    grouped: Option<Grouped>,
    #[serde(default)]
    response: Option<DocList>,
    #[serde(default)]
    facet_counts: FacetCounts,
}

#[derive(Debug, Deserialize)]
struct Grouped {
    handle: GroupSummary,
}

#[derive(Debug, Deserialize)]
struct GroupSummary {
    matches: u64,
    #[serde(default)]
    ngroups: u64,
}

#[derive(Debug, Deserialize)]
struct DocList {
    #[serde(rename = "numFound")]
    num_found: u64,
    #[serde(default)]
    docs: Vec<IndexDocument>,
}

#[derive(Debug, Default, Deserialize)]
struct FacetCounts {
    #[serde(default)]
    facet_fields: FacetFields,
    #[serde(default)]
    facet_ranges: FacetRanges,
}

#[derive(Debug, Default, Deserialize)]
struct FacetFields {
    #[serde(default)]
    country: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct FacetRanges {
    #[serde(default)]
    time: RangeCounts,
}

#[derive(Debug, Default, Deserialize)]
struct RangeCounts {
    #[serde(default)]
    counts: Vec<Value>,
}

impl SelectResponse {
    fn into_result(self, single_document: bool) -> Result<FacetResult, StorageError> {
        let countries = country_counts(&self.facet_counts.facet_fields.country)?;
        let dates = date_counts(&self.facet_counts.facet_ranges.time.counts)?;

        if single_document {
            let docs = self
                .response
                .ok_or_else(|| StorageError::Query("select response has no result list".to_owned()))?;
            return Ok(FacetResult {
                matches: docs.num_found,
                ngroups: u64::from(docs.num_found > 0),
                countries,
                dates,
                first: docs.docs.into_iter().next(),
            });
        }

        let group = self
            .grouped
            .ok_or_else(|| StorageError::Query("select response is not grouped by handle".to_owned()))?
            .handle;
        Ok(FacetResult {
            matches: group.matches,
            ngroups: group.ngroups,
            countries,
            dates,
            first: None,
        })
    }
}
