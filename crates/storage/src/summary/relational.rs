//! 관계형 요약
//!
//! 요청 사실 테이블을 엔티티별로 묶어 다운로드 수, 국가 분포, 일자 분포를 구합니다.
//! 일자는 저장된 ISO 시각의 SQLite `date()` (UTC 기준)입니다.

use metrics::counter;
use sqlx::SqlitePool;
use tracing::{debug, info};

use oastats_core::metrics as m;
use oastats_core::types::{AuthorRef, CountryCount, DateCount, SummaryId, SummaryObject};

use crate::error::StorageError;
use crate::records::SummaryStore;

use super::{SummaryReport, count};

/// 집계 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Author(i64),
    Dlc(i64),
    Document(i64),
    Overall,
}

impl Scope {
    /// 범위에 속한 `requests r` 행을 고르는 FROM/WHERE 절
    fn requests(self) -> &'static str {
        match self {
            Self::Author(_) => {
                "FROM requests r JOIN documents_authors s ON s.document_id = r.document_id WHERE s.author_id = ?"
            }
            Self::Dlc(_) => {
                "FROM requests r JOIN documents_dlcs s ON s.document_id = r.document_id WHERE s.dlc_id = ?"
            }
            Self::Document(_) => "FROM requests r WHERE r.document_id = ?",
            Self::Overall => "FROM requests r",
        }
    }

    /// 범위에 속한 문서 수를 세는 질의
    fn size(self) -> Option<&'static str> {
        match self {
            Self::Author(_) => Some("SELECT COUNT(*) FROM documents_authors WHERE author_id = ?"),
            Self::Dlc(_) => Some("SELECT COUNT(*) FROM documents_dlcs WHERE dlc_id = ?"),
            Self::Document(_) => None,
            Self::Overall => Some("SELECT COUNT(*) FROM documents"),
        }
    }

    fn id(self) -> Option<i64> {
        match self {
            Self::Author(id) | Self::Dlc(id) | Self::Document(id) => Some(id),
            Self::Overall => None,
        }
    }
}

async fn scalar(pool: &SqlitePool, sql: &str, scope: Scope) -> Result<u64, StorageError> {
    let mut query = sqlx::query_scalar::<_, i64>(sql);
    if let Some(id) = scope.id() {
        query = query.bind(id);
    }
    Ok(count(query.fetch_one(pool).await?))
}

async fn pairs(
    pool: &SqlitePool,
    sql: &str,
    scope: Scope,
) -> Result<Vec<(Option<String>, i64)>, StorageError> {
    let mut query = sqlx::query_as::<_, (Option<String>, i64)>(sql);
    if let Some(id) = scope.id() {
        query = query.bind(id);
    }
    Ok(query.fetch_all(pool).await?)
}

/// 범위의 다운로드 수, 국가 분포, 일자 분포를 채웁니다.
async fn fill_breakdown(
    pool: &SqlitePool,
    scope: Scope,
    summary: &mut SummaryObject,
) -> Result<(), StorageError> {
    let from = scope.requests();

    summary.downloads = scalar(pool, &format!("SELECT COUNT(*) {from}"), scope).await?;
    if let Some(size_sql) = scope.size() {
        summary.size = scalar(pool, size_sql, scope).await?;
    }

    summary.countries = pairs(
        pool,
        &format!("SELECT r.country, COUNT(*) {from} GROUP BY r.country ORDER BY 2 DESC, 1"),
        scope,
    )
    .await?
    .into_iter()
    .map(|(country, n)| CountryCount {
        country: country.unwrap_or_default(),
        downloads: count(n),
    })
    .collect();

    summary.dates = pairs(
        pool,
        &format!("SELECT date(r.datetime), COUNT(*) {from} GROUP BY 1 ORDER BY 1"),
        scope,
    )
    .await?
    .into_iter()
    .filter_map(|(date, n)| {
        date.map(|date| DateCount {
            date,
            downloads: count(n),
        })
    })
    .collect();

    Ok(())
}

/// 저자 요약. 저자가 없으면 `None`.
pub async fn author_summary(
    pool: &SqlitePool,
    mit_id: &str,
) -> Result<Option<SummaryObject>, StorageError> {
    let row: Option<(i64, String, String)> =
        sqlx::query_as("SELECT id, mit_id, name FROM authors WHERE mit_id = ?")
            .bind(mit_id)
            .fetch_optional(pool)
            .await?;
    let Some((id, mitid, name)) = row else {
        return Ok(None);
    };

    let mut summary = SummaryObject::new(SummaryId::Author { mitid, name });
    fill_breakdown(pool, Scope::Author(id), &mut summary).await?;
    Ok(Some(summary))
}

/// 학과 요약. 학과가 없으면 `None`.
pub async fn dlc_summary(
    pool: &SqlitePool,
    dlc_id: i64,
) -> Result<Option<SummaryObject>, StorageError> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT canonical_name, display_name FROM dlcs WHERE id = ?")
            .bind(dlc_id)
            .fetch_optional(pool)
            .await?;
    let Some((canonical, display)) = row else {
        return Ok(None);
    };

    let mut summary = SummaryObject::new(SummaryId::Department { canonical, display });
    fill_breakdown(pool, Scope::Dlc(dlc_id), &mut summary).await?;
    Ok(Some(summary))
}

/// 문서 요약. 제목과 저자(parents)를 포함합니다.
pub async fn handle_summary(
    pool: &SqlitePool,
    document_id: i64,
) -> Result<Option<SummaryObject>, StorageError> {
    let row: Option<(String, Option<String>)> =
        sqlx::query_as("SELECT handle, title FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(pool)
            .await?;
    let Some((handle, title)) = row else {
        return Ok(None);
    };

    let parents: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT a.mit_id, a.name
        FROM authors a JOIN documents_authors da ON da.author_id = a.id
        WHERE da.document_id = ?
        ORDER BY da.id
        "#,
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    let mut summary = SummaryObject::new(SummaryId::Document { handle });
    summary.title = title;
    summary.parents = parents
        .into_iter()
        .map(|(id, name)| AuthorRef::new(id, name))
        .collect();
    fill_breakdown(pool, Scope::Document(document_id), &mut summary).await?;
    Ok(Some(summary))
}

/// 전체 요약. size는 문서 수, downloads는 요청 수입니다.
pub async fn overall_summary(pool: &SqlitePool) -> Result<SummaryObject, StorageError> {
    let mut summary = SummaryObject::new(SummaryId::Overall);
    fill_breakdown(pool, Scope::Overall, &mut summary).await?;
    Ok(summary)
}

/// 모든 엔티티의 요약을 관계형 DB에서 계산하여 요약 컬렉션을 교체합니다.
///
/// 저장소 에러는 치명적이므로 첫 에러에서 중단하며, 이때 기존 요약은 그대로 남습니다.
pub async fn summarize_relational(
    pool: &SqlitePool,
    store: &SummaryStore,
) -> Result<SummaryReport, StorageError> {
    store.begin_run().await?;
    let mut report = SummaryReport::default();

    let authors: Vec<String> = sqlx::query_scalar("SELECT mit_id FROM authors ORDER BY id")
        .fetch_all(pool)
        .await?;
    for mit_id in &authors {
        if let Some(summary) = author_summary(pool, mit_id).await? {
            stage(store, &summary, &mut report).await?;
        }
    }

    let dlcs: Vec<i64> = sqlx::query_scalar("SELECT id FROM dlcs ORDER BY id")
        .fetch_all(pool)
        .await?;
    for id in dlcs {
        if let Some(summary) = dlc_summary(pool, id).await? {
            stage(store, &summary, &mut report).await?;
        }
    }

    let documents: Vec<i64> = sqlx::query_scalar("SELECT id FROM documents ORDER BY id")
        .fetch_all(pool)
        .await?;
    for id in documents {
        if let Some(summary) = handle_summary(pool, id).await? {
            stage(store, &summary, &mut report).await?;
        }
    }

    stage(store, &overall_summary(pool).await?, &mut report).await?;
    store.commit_run().await?;

    info!(written = report.written, "relational summary complete");
    Ok(report)
}

async fn stage(
    store: &SummaryStore,
    summary: &SummaryObject,
    report: &mut SummaryReport,
) -> Result<(), StorageError> {
    store.stage(summary).await?;
    report.written += 1;
    counter!(m::SUMMARY_OBJECTS_WRITTEN_TOTAL, m::LABEL_KIND => summary.id.kind()).increment(1);
    debug!(id = %summary.id, downloads = summary.downloads, "summary staged");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestFact, RequestTableSink};
    use crate::resolver::{DocumentIdentity, EntityResolver};
    use crate::writer::BatchSink;
    use crate::{db, migrate};
    use oastats_core::types::Department;

    fn fact(document_id: i64, country: &str, datetime: &str) -> RequestFact {
        RequestFact {
            status: "200".to_owned(),
            country: country.to_owned(),
            url: "/openaccess-disseminate/1721.1/1".to_owned(),
            referer: "-".to_owned(),
            user_agent: "Mozilla/5.0".to_owned(),
            datetime: datetime.to_owned(),
            document_id,
        }
    }

    /// 문서 두 개, 저자 두 명, 학과 하나, 요청 다섯 건
    async fn seeded() -> (tempfile::TempDir, SqlitePool, i64, i64) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect(dir.path().join("rel.db")).await.unwrap();
        migrate::migrate_relational(&pool).await.unwrap();

        let smith = AuthorRef::new("111", "Smith, J.");
        let doe = AuthorRef::new("222", "Doe, J.");
        let physics = Department::new("Physics", "Department of Physics");

        let mut resolver = EntityResolver::new(pool.clone());
        let first = resolver
            .resolve(&DocumentIdentity {
                handle: "1721.1/100",
                title: Some("First Paper"),
                authors: &[smith.clone(), doe],
                dlcs: &[physics.clone()],
            })
            .await
            .unwrap();
        let second = resolver
            .resolve(&DocumentIdentity {
                handle: "1721.1/200",
                title: Some("Second Paper"),
                authors: &[smith],
                dlcs: &[physics],
            })
            .await
            .unwrap();

        let mut sink = RequestTableSink::new(pool.clone());
        sink.send_batch(&[
            fact(first, "USA", "2013-01-31T10:00:00-05:00"),
            fact(first, "USA", "2013-01-31T11:00:00-05:00"),
            // UTC 기준으로 다음 날
            fact(first, "AUS", "2013-01-31T23:58:51-05:00"),
            fact(second, "AUS", "2013-02-01T09:00:00-05:00"),
            fact(second, "USA", "2013-02-01T10:00:00-05:00"),
        ])
        .await
        .unwrap();

        (dir, pool, first, second)
    }

    #[tokio::test]
    async fn author_summary_counts_documents_and_downloads() {
        let (_dir, pool, _, _) = seeded().await;

        let smith = author_summary(&pool, "111").await.unwrap().unwrap();
        assert_eq!(smith.size, 2);
        assert_eq!(smith.downloads, 5);
        assert_eq!(
            smith.countries,
            vec![
                CountryCount { country: "USA".to_owned(), downloads: 3 },
                CountryCount { country: "AUS".to_owned(), downloads: 2 },
            ]
        );
        assert_eq!(
            smith.dates,
            vec![
                DateCount { date: "2013-01-31".to_owned(), downloads: 2 },
                DateCount { date: "2013-02-01".to_owned(), downloads: 3 },
            ]
        );

        let doe = author_summary(&pool, "222").await.unwrap().unwrap();
        assert_eq!(doe.size, 1);
        assert_eq!(doe.downloads, 3);

        assert!(author_summary(&pool, "999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn handle_summary_carries_title_and_parents() {
        let (_dir, pool, first, _) = seeded().await;
        let summary = handle_summary(&pool, first).await.unwrap().unwrap();
        assert_eq!(summary.title.as_deref(), Some("First Paper"));
        assert_eq!(summary.downloads, 3);
        assert_eq!(
            summary.parents,
            vec![AuthorRef::new("111", "Smith, J."), AuthorRef::new("222", "Doe, J.")]
        );
    }

    #[tokio::test]
    async fn overall_summary_counts_everything() {
        let (_dir, pool, _, _) = seeded().await;
        let overall = overall_summary(&pool).await.unwrap();
        assert_eq!(overall.size, 2);
        assert_eq!(overall.downloads, 5);
        assert_eq!(overall.dates.len(), 2);
    }

    #[tokio::test]
    async fn summarize_relational_replaces_collection() {
        let (dir, pool, _, _) = seeded().await;
        let records = db::connect(dir.path().join("records.db")).await.unwrap();
        migrate::migrate_records(&records).await.unwrap();
        let store = SummaryStore::new(records);

        let report = summarize_relational(&pool, &store).await.unwrap();
        // 저자 2 + 학과 1 + 문서 2 + overall 1
        assert_eq!(report, SummaryReport { written: 6, failed: 0 });
        assert_eq!(store.count().await.unwrap(), 6);

        let dlc = store.get("dlc:Physics").await.unwrap().unwrap();
        assert_eq!(dlc["size"], 2);
        assert_eq!(dlc["downloads"], 5);
        assert_eq!(dlc["_id"]["display"], "Department of Physics");

        let doc = store.get("handle:1721.1/200").await.unwrap().unwrap();
        assert_eq!(doc["title"], "Second Paper");
        assert_eq!(doc["parents"][0]["mitid"], "111");
    }
}
