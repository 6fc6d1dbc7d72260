//! 레코드 컬렉션과 요약 컬렉션
//!
//! [`RecordStore`]는 보강 레코드를 JSON 본문으로 저장하는 문서형 컬렉션이고,
//! [`SummaryStore`]는 요약 객체를 스테이징 테이블에 모았다가 한 트랜잭션으로
//! `summary` 테이블을 통째로 교체합니다.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use oastats_core::types::{AuthorRef, Department, EnrichedRecord, SummaryObject};

use crate::error::StorageError;
use crate::writer::BatchSink;

/// 다중 행 INSERT 한 번에 넣는 최대 행 수
const INSERT_CHUNK: usize = 1_000;

/// 보강 레코드 컬렉션
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 레코드를 한 트랜잭션으로 삽입하고 삽입한 행 수를 반환합니다.
    pub async fn insert_many(&self, records: &[EnrichedRecord]) -> Result<u64, StorageError> {
        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(INSERT_CHUNK) {
            let bodies = chunk
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()?;

            let mut query: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("INSERT INTO records (handle, time, body) ");
            query.push_values(chunk.iter().zip(bodies), |mut row, (record, body)| {
                row.push_bind(record.handle.clone())
                    .push_bind(record.time.clone())
                    .push_bind(body);
            });
            inserted += query.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// `after_id`보다 큰 ID의 레코드를 ID 순으로 최대 `limit`개 읽습니다.
    ///
    /// 반환된 마지막 ID를 다음 호출의 `after_id`로 넘기면 전체를 한 번씩 순회합니다.
    pub async fn page(
        &self,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<(i64, EnrichedRecord)>, StorageError> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, body FROM records WHERE id > ? ORDER BY id LIMIT ?")
                .bind(after_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(id, body)| Ok((id, serde_json::from_str(&body)?)))
            .collect()
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// 레코드에 등장한 저자 목록. ID가 없거나 비어 있는 저자는 제외합니다.
    ///
    /// 같은 ID가 여러 이름으로 등장하면 사전순으로 가장 앞선 이름 하나만 남깁니다.
    pub async fn distinct_authors(&self) -> Result<Vec<AuthorRef>, StorageError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT json_extract(a.value, '$.mitid') AS mitid, MIN(json_extract(a.value, '$.name'))
            FROM records, json_each(records.body, '$.authors') AS a
            WHERE COALESCE(json_extract(a.value, '$.mitid'), '') != ''
            GROUP BY mitid
            ORDER BY mitid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| AuthorRef::new(id, name.unwrap_or_default()))
            .collect())
    }

    /// 레코드에 등장한 학과 목록. 정규화명이 비어 있는 학과는 제외합니다.
    ///
    /// 정규화명 하나당 표시명 하나만 남깁니다.
    pub async fn distinct_dlcs(&self) -> Result<Vec<Department>, StorageError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT json_extract(d.value, '$.canonical') AS canonical, MIN(json_extract(d.value, '$.display'))
            FROM records, json_each(records.body, '$.dlcs') AS d
            WHERE COALESCE(json_extract(d.value, '$.canonical'), '') != ''
            GROUP BY canonical
            ORDER BY canonical
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(canonical, display)| Department::new(canonical, display.unwrap_or_default()))
            .collect())
    }

    /// 레코드에 등장한 문서 핸들 목록
    pub async fn distinct_handles(&self) -> Result<Vec<String>, StorageError> {
        let handles = sqlx::query_scalar(
            "SELECT DISTINCT handle FROM records WHERE handle IS NOT NULL ORDER BY handle",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(handles)
    }
}

impl BatchSink<EnrichedRecord> for RecordStore {
    async fn send_batch(&mut self, batch: &[EnrichedRecord]) -> Result<(), StorageError> {
        let inserted = self.insert_many(batch).await?;
        debug!(inserted, "records batch stored");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "records"
    }
}

/// 요약 컬렉션
///
/// 한 번의 요약 실행은 [`begin_run`](Self::begin_run) → [`stage`](Self::stage) 반복 →
/// [`commit_run`](Self::commit_run) 순서로 진행됩니다. 커밋 전까지 기존 `summary`는
/// 그대로 보입니다.
#[derive(Clone)]
pub struct SummaryStore {
    pool: SqlitePool,
}

impl SummaryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 이전 실행이 남긴 스테이징 행을 지웁니다.
    pub async fn begin_run(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM summary_staging")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 요약 객체 하나를 스테이징에 기록합니다. 같은 키는 덮어씁니다.
    pub async fn stage(&self, summary: &SummaryObject) -> Result<(), StorageError> {
        let body = serde_json::to_string(summary)?;
        sqlx::query("INSERT OR REPLACE INTO summary_staging (id, kind, body) VALUES (?, ?, ?)")
            .bind(summary.id.key())
            .bind(summary.id.kind())
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 스테이징 내용으로 `summary`를 원자적으로 교체하고 행 수를 반환합니다.
    pub async fn commit_run(&self) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM summary").execute(&mut *tx).await?;
        let swapped = sqlx::query("INSERT INTO summary (id, kind, body) SELECT id, kind, body FROM summary_staging")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM summary_staging")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(summaries = swapped, "summary collection replaced");
        Ok(swapped)
    }

    /// 키로 요약 문서를 읽습니다.
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM summary WHERE id = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        body.map(|b| serde_json::from_str(&b).map_err(StorageError::from))
            .transpose()
    }

    /// 종류별 요약 문서 수
    pub async fn count_kind(&self, kind: &str) -> Result<i64, StorageError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM summary WHERE kind = ?")
            .bind(kind)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM summary")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use oastats_core::types::SummaryId;

    async fn pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect(dir.path().join("records.db")).await.unwrap();
        migrate::migrate_records(&pool).await.unwrap();
        (dir, pool)
    }

    fn record(handle: Option<&str>, authors: Vec<AuthorRef>, dlcs: Vec<Department>) -> EnrichedRecord {
        EnrichedRecord {
            ip_address: "1.2.3.4".to_owned(),
            time: "2013-01-31T23:58:51-05:00".to_owned(),
            method: "GET".to_owned(),
            request: "/openaccess-disseminate/1721.1/1".to_owned(),
            http_version: "1.1".to_owned(),
            status: "200".to_owned(),
            bytes: "10".to_owned(),
            referer: "-".to_owned(),
            user_agent: "Mozilla/5.0".to_owned(),
            country: "AUS".to_owned(),
            handle: handle.map(str::to_owned),
            title: None,
            dlcs,
            authors,
        }
    }

    #[tokio::test]
    async fn insert_and_page_through_records() {
        let (_dir, pool) = pool().await;
        let store = RecordStore::new(pool);
        let records: Vec<_> = (0..5)
            .map(|i| record(Some(&format!("h{i}")), Vec::new(), Vec::new()))
            .collect();
        assert_eq!(store.insert_many(&records).await.unwrap(), 5);
        assert_eq!(store.count().await.unwrap(), 5);

        let first = store.page(0, 3).await.unwrap();
        assert_eq!(first.len(), 3);
        let last_id = first[2].0;
        let rest = store.page(last_id, 3).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[1].1.handle.as_deref(), Some("h4"));
    }

    #[tokio::test]
    async fn distinct_entities_skip_invalid_keys() {
        let (_dir, pool) = pool().await;
        let mut store = RecordStore::new(pool);
        let smith = AuthorRef::new("111", "Smith, J.");
        let physics = Department::new("Physics", "Department of Physics");

        store
            .send_batch(&[
                record(Some("a"), vec![smith.clone(), AuthorRef::new("", "No Id")], vec![physics.clone()]),
                record(Some("b"), vec![smith.clone()], vec![Department::new("", "Nameless")]),
                record(None, Vec::new(), Vec::new()),
            ])
            .await
            .unwrap();

        assert_eq!(store.distinct_authors().await.unwrap(), vec![smith]);
        assert_eq!(store.distinct_dlcs().await.unwrap(), vec![physics]);
        assert_eq!(store.distinct_handles().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn distinct_entities_are_keyed_by_id() {
        let (_dir, pool) = pool().await;
        let mut store = RecordStore::new(pool);

        store
            .send_batch(&[
                record(
                    Some("a"),
                    vec![AuthorRef::new("111", "Smith, John")],
                    vec![Department::new("Physics", "Physics Dept.")],
                ),
                record(
                    Some("b"),
                    vec![AuthorRef::new("111", "Smith, J."), AuthorRef::new("222", "Doe, J.")],
                    vec![Department::new("Physics", "Department of Physics")],
                ),
            ])
            .await
            .unwrap();

        assert_eq!(
            store.distinct_authors().await.unwrap(),
            vec![AuthorRef::new("111", "Smith, J."), AuthorRef::new("222", "Doe, J.")]
        );
        assert_eq!(
            store.distinct_dlcs().await.unwrap(),
            vec![Department::new("Physics", "Department of Physics")]
        );
    }

    #[tokio::test]
    async fn summary_swap_replaces_previous_run() {
        let (_dir, pool) = pool().await;
        let summaries = SummaryStore::new(pool);

        summaries.begin_run().await.unwrap();
        summaries.stage(&SummaryObject::new(SummaryId::Overall)).await.unwrap();
        summaries
            .stage(&SummaryObject::new(SummaryId::Document {
                handle: "old".to_owned(),
            }))
            .await
            .unwrap();
        assert_eq!(summaries.commit_run().await.unwrap(), 2);

        summaries.begin_run().await.unwrap();
        let mut overall = SummaryObject::new(SummaryId::Overall);
        overall.downloads = 9;
        summaries.stage(&overall).await.unwrap();

        // 커밋 전에는 이전 결과가 보임
        assert_eq!(summaries.count().await.unwrap(), 2);

        assert_eq!(summaries.commit_run().await.unwrap(), 1);
        assert!(summaries.get("handle:old").await.unwrap().is_none());
        let body = summaries.get("overall").await.unwrap().unwrap();
        assert_eq!(body["downloads"], 9);
        assert_eq!(summaries.count_kind("overall").await.unwrap(), 1);
    }
}
