//! 검색 색인 기반 요약
//!
//! 엔티티 하나당 작업 하나(패싯 질의 + 스테이징 기록)를 만들어 세마포어로 동시 실행 수를
//! 제한한 채 병렬로 실행합니다. 한 작업의 실패는 로그와 메트릭으로만 남고 다른 작업에
//! 영향을 주지 않습니다.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use oastats_core::config::SearchSection;
use oastats_core::metrics as m;
use oastats_core::types::{SummaryId, SummaryObject};

use crate::error::StorageError;
use crate::records::{RecordStore, SummaryStore};
use crate::search::{FacetQuery, FacetResult, QueryTarget, SearchIndex};

use super::SummaryReport;

/// 요약 대상의 패싯 질의 대상
fn target_of(id: &SummaryId) -> QueryTarget {
    match id {
        SummaryId::Author { mitid, .. } => QueryTarget::Author(mitid.clone()),
        SummaryId::Department { canonical, .. } => QueryTarget::Dlc(canonical.clone()),
        SummaryId::Document { handle } => QueryTarget::Handle(handle.clone()),
        SummaryId::Overall => QueryTarget::Overall,
    }
}

/// 패싯 결과로 요약 객체를 만듭니다.
///
/// 그룹 질의는 `size = ngroups`, `downloads = matches`이고
/// 문서 질의는 첫 문서에서 제목과 저자를 가져옵니다.
pub fn build_summary(id: SummaryId, result: FacetResult) -> SummaryObject {
    let is_document = matches!(id, SummaryId::Document { .. });
    let mut summary = SummaryObject::new(id);
    summary.downloads = result.matches;
    summary.countries = result.countries;
    summary.dates = result.dates;

    if is_document {
        if let Some(first) = result.first {
            summary.parents = first.parents();
            summary.title = first.title;
        }
    } else {
        summary.size = result.ngroups;
    }
    summary
}

/// 검색 색인 기반 요약기
pub struct SearchSummarizer<I> {
    index: Arc<I>,
    store: SummaryStore,
    facet_start: String,
    facet_end: String,
    workers: usize,
}

impl<I: SearchIndex + 'static> SearchSummarizer<I> {
    pub fn new(index: Arc<I>, store: SummaryStore) -> Self {
        let defaults = SearchSection::default();
        Self {
            index,
            store,
            facet_start: defaults.facet_start,
            facet_end: defaults.facet_end,
            workers: defaults.workers,
        }
    }

    /// `[search]` 설정의 패싯 범위와 워커 수를 적용합니다.
    pub fn with_section(self, section: &SearchSection) -> Self {
        self.facet_range(&section.facet_start, &section.facet_end)
            .workers(section.workers)
    }

    /// 날짜 패싯 범위를 설정합니다.
    pub fn facet_range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.facet_start = start.into();
        self.facet_end = end.into();
        self
    }

    /// 동시 작업 수를 설정합니다. 0은 1로 취급합니다.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// 레코드 컬렉션에 등장한 모든 엔티티와 `overall`을 요약 대상으로 모읍니다.
    pub async fn targets(records: &RecordStore) -> Result<Vec<SummaryId>, StorageError> {
        let mut targets: Vec<SummaryId> = records
            .distinct_authors()
            .await?
            .into_iter()
            .map(|a| SummaryId::Author {
                mitid: a.id,
                name: a.name,
            })
            .collect();
        targets.extend(records.distinct_dlcs().await?.into_iter().map(|d| {
            SummaryId::Department {
                canonical: d.canonical_name,
                display: d.display_name,
            }
        }));
        targets.extend(
            records
                .distinct_handles()
                .await?
                .into_iter()
                .map(|handle| SummaryId::Document { handle }),
        );
        targets.push(SummaryId::Overall);
        Ok(targets)
    }

    /// 대상별 작업을 실행하고 요약 컬렉션을 교체합니다.
    ///
    /// 개별 작업의 실패는 보고서의 `failed`로 집계되며, 스테이징 초기화나
    /// 최종 교체 실패만 에러로 반환됩니다.
    pub async fn run(&self, targets: Vec<SummaryId>) -> Result<SummaryReport, StorageError> {
        self.store.begin_run().await?;

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for id in targets {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| StorageError::Query(format!("worker pool closed: {e}")))?;
            let index = Arc::clone(&self.index);
            let store = self.store.clone();
            let query = FacetQuery::new(target_of(&id), &self.facet_start, &self.facet_end);

            tasks.spawn(async move {
                let result = summarize_one(index.as_ref(), &store, id.clone(), &query).await;
                drop(permit);
                (id, result)
            });
        }

        let mut report = SummaryReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(()))) => {
                    report.written += 1;
                    counter!(m::SUMMARY_OBJECTS_WRITTEN_TOTAL, m::LABEL_KIND => id.kind())
                        .increment(1);
                }
                Ok((id, Err(e))) => {
                    report.failed += 1;
                    counter!(m::SUMMARY_TASKS_FAILED_TOTAL, m::LABEL_KIND => id.kind())
                        .increment(1);
                    warn!(id = %id, error = %e, "summary task failed");
                }
                Err(e) => {
                    report.failed += 1;
                    counter!(m::SUMMARY_TASKS_FAILED_TOTAL, m::LABEL_KIND => "panic").increment(1);
                    error!(error = %e, "summary task panicked");
                }
            }
        }

        self.store.commit_run().await?;
        info!(
            written = report.written,
            failed = report.failed,
            workers = self.workers,
            "search summary complete"
        );
        Ok(report)
    }
}

async fn summarize_one<I: SearchIndex>(
    index: &I,
    store: &SummaryStore,
    id: SummaryId,
    query: &FacetQuery,
) -> Result<(), StorageError> {
    let result = index.query(query).await?;
    let summary = build_summary(id, result);
    store.stage(&summary).await?;
    debug!(id = %summary.id, downloads = summary.downloads, "summary staged");
    Ok(())
}
