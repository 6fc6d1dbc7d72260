//! 엔티티 해석기
//!
//! 보강 레코드의 저자, 학과(DLC), 문서를 정규화된 관계형 테이블의 행으로 해석하고
//! 문서의 대리 키(surrogate id)를 돌려줍니다.
//!
//! - 자연 키: 저자 `mit_id`, 학과 `canonical_name`, 문서 `handle`
//! - 조회 후 없으면 삽입: `INSERT .. ON CONFLICT DO NOTHING` 뒤 `SELECT id`
//! - 한 문서의 해석 전체(저자 + 학과 + 문서 + 조인 행)는 하나의 트랜잭션
//! - 유효하지 않은 저자/학과는 연결에서 조용히 제외
//!
//! [`EntityResolver`]는 커밋된 결과만 캐시합니다. 캐시는 반복 조회를 건너뛸 뿐이고
//! 중복 방지는 테이블의 UNIQUE 제약이 담당합니다.

use std::collections::HashMap;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use oastats_core::types::{AuthorRef, Department, EnrichedRecord};

use crate::error::StorageError;

/// 해석할 문서 하나의 식별 정보
#[derive(Debug, Clone, Copy)]
pub struct DocumentIdentity<'a> {
    pub handle: &'a str,
    pub title: Option<&'a str>,
    pub authors: &'a [AuthorRef],
    pub dlcs: &'a [Department],
}

impl<'a> DocumentIdentity<'a> {
    /// 보강 레코드에서 식별 정보를 꺼냅니다. 핸들이 없으면 `None`.
    pub fn from_record(record: &'a EnrichedRecord) -> Option<Self> {
        Some(Self {
            handle: record.handle.as_deref()?,
            title: record.title.as_deref(),
            authors: &record.authors,
            dlcs: &record.dlcs,
        })
    }
}

/// 자연 키 → 대리 키 매핑
#[derive(Debug, Default)]
struct KnownIds {
    authors: HashMap<String, i64>,
    dlcs: HashMap<String, i64>,
    documents: HashMap<String, i64>,
}

impl KnownIds {
    fn absorb(&mut self, other: KnownIds) {
        self.authors.extend(other.authors);
        self.dlcs.extend(other.dlcs);
        self.documents.extend(other.documents);
    }
}

/// 호출자가 연 트랜잭션 안에서 문서를 해석합니다.
///
/// 트랜잭션 경계는 호출자가 관리합니다 (`&mut *tx`를 넘기세요).
pub async fn resolve_document(
    conn: &mut SqliteConnection,
    doc: &DocumentIdentity<'_>,
) -> Result<i64, StorageError> {
    let mut learned = KnownIds::default();
    resolve_in(conn, doc, &KnownIds::default(), &mut learned).await
}

async fn resolve_in(
    conn: &mut SqliteConnection,
    doc: &DocumentIdentity<'_>,
    known: &KnownIds,
    learned: &mut KnownIds,
) -> Result<i64, StorageError> {
    let mut author_ids = Vec::with_capacity(doc.authors.len());
    for author in doc.authors.iter().filter(|a| a.is_valid()) {
        let id = match known.authors.get(&author.id) {
            Some(&id) => id,
            None => author_id(conn, author).await?,
        };
        learned.authors.insert(author.id.clone(), id);
        author_ids.push(id);
    }

    let mut dlc_ids = Vec::with_capacity(doc.dlcs.len());
    for dlc in doc.dlcs.iter().filter(|d| d.is_valid()) {
        let id = match known.dlcs.get(&dlc.canonical_name) {
            Some(&id) => id,
            None => dlc_id(conn, dlc).await?,
        };
        learned.dlcs.insert(dlc.canonical_name.clone(), id);
        dlc_ids.push(id);
    }

    let document_id = document_id(conn, doc.handle, doc.title).await?;
    learned.documents.insert(doc.handle.to_owned(), document_id);

    for author_id in author_ids {
        sqlx::query(
            "INSERT INTO documents_authors (document_id, author_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(document_id)
        .bind(author_id)
        .execute(&mut *conn)
        .await?;
    }
    for dlc_id in dlc_ids {
        sqlx::query(
            "INSERT INTO documents_dlcs (document_id, dlc_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(document_id)
        .bind(dlc_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(document_id)
}

async fn author_id(conn: &mut SqliteConnection, author: &AuthorRef) -> Result<i64, StorageError> {
    sqlx::query("INSERT INTO authors (name, mit_id) VALUES (?, ?) ON CONFLICT(mit_id) DO NOTHING")
        .bind(&author.name)
        .bind(&author.id)
        .execute(&mut *conn)
        .await?;
    let id = sqlx::query_scalar("SELECT id FROM authors WHERE mit_id = ?")
        .bind(&author.id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

async fn dlc_id(conn: &mut SqliteConnection, dlc: &Department) -> Result<i64, StorageError> {
    sqlx::query(
        "INSERT INTO dlcs (display_name, canonical_name) VALUES (?, ?) ON CONFLICT(canonical_name) DO NOTHING",
    )
    .bind(&dlc.display_name)
    .bind(&dlc.canonical_name)
    .execute(&mut *conn)
    .await?;
    let id = sqlx::query_scalar("SELECT id FROM dlcs WHERE canonical_name = ?")
        .bind(&dlc.canonical_name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

async fn document_id(
    conn: &mut SqliteConnection,
    handle: &str,
    title: Option<&str>,
) -> Result<i64, StorageError> {
    sqlx::query("INSERT INTO documents (handle, title) VALUES (?, ?) ON CONFLICT(handle) DO NOTHING")
        .bind(handle)
        .bind(title)
        .execute(&mut *conn)
        .await?;
    let id = sqlx::query_scalar("SELECT id FROM documents WHERE handle = ?")
        .bind(handle)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

/// 커밋된 해석 결과를 기억하는 엔티티 해석기
pub struct EntityResolver {
    pool: SqlitePool,
    known: KnownIds,
}

impl EntityResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            known: KnownIds::default(),
        }
    }

    /// 문서를 해석하고 ID를 반환합니다.
    ///
    /// 이미 이 실행에서 해석한 핸들이면 DB를 거치지 않습니다.
    pub async fn resolve(&mut self, doc: &DocumentIdentity<'_>) -> Result<i64, StorageError> {
        if let Some(&id) = self.known.documents.get(doc.handle) {
            return Ok(id);
        }

        let mut learned = KnownIds::default();
        let mut tx = self.pool.begin().await?;
        let id = resolve_in(&mut tx, doc, &self.known, &mut learned).await?;
        tx.commit().await?;

        debug!(handle = doc.handle, document_id = id, "resolved document");
        self.known.absorb(learned);
        Ok(id)
    }

    /// 이 실행에서 해석한 문서 수
    pub fn cached_documents(&self) -> usize {
        self.known.documents.len()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    async fn pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect(dir.path().join("rel.db")).await.unwrap();
        migrate::migrate_relational(&pool).await.unwrap();
        (dir, pool)
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn authors() -> Vec<AuthorRef> {
        vec![
            AuthorRef::new("111", "Smith, J."),
            AuthorRef::new("", "No Id"),
            AuthorRef::new("222", "Doe, J."),
        ]
    }

    fn dlcs() -> Vec<Department> {
        vec![
            Department::new("Physics", "Department of Physics"),
            Department::new("", "Nameless"),
        ]
    }

    #[tokio::test]
    async fn resolving_twice_is_idempotent() {
        let (_dir, pool) = pool().await;
        let authors = authors();
        let dlcs = dlcs();
        let doc = DocumentIdentity {
            handle: "1721.1/100",
            title: Some("First Paper"),
            authors: &authors,
            dlcs: &dlcs,
        };

        let mut tx = pool.begin().await.unwrap();
        let first = resolve_document(&mut tx, &doc).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let second = resolve_document(&mut tx, &doc).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(count(&pool, "documents").await, 1);
        assert_eq!(count(&pool, "authors").await, 2);
        assert_eq!(count(&pool, "dlcs").await, 1);
        assert_eq!(count(&pool, "documents_authors").await, 2);
        assert_eq!(count(&pool, "documents_dlcs").await, 1);
    }

    #[tokio::test]
    async fn shared_author_is_reused_across_documents() {
        let (_dir, pool) = pool().await;
        let shared = vec![AuthorRef::new("111", "Smith, J.")];
        let mut resolver = EntityResolver::new(pool.clone());

        let a = resolver
            .resolve(&DocumentIdentity {
                handle: "1721.1/100",
                title: None,
                authors: &shared,
                dlcs: &[],
            })
            .await
            .unwrap();
        let b = resolver
            .resolve(&DocumentIdentity {
                handle: "1721.1/200",
                title: None,
                authors: &shared,
                dlcs: &[],
            })
            .await
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(count(&pool, "authors").await, 1);
        assert_eq!(count(&pool, "documents_authors").await, 2);
        assert_eq!(resolver.cached_documents(), 2);
    }

    #[tokio::test]
    async fn rolled_back_resolution_leaves_no_rows() {
        let (_dir, pool) = pool().await;
        let authors = authors();
        let doc = DocumentIdentity {
            handle: "1721.1/300",
            title: Some("Draft"),
            authors: &authors,
            dlcs: &[],
        };

        let mut tx = pool.begin().await.unwrap();
        resolve_document(&mut tx, &doc).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(count(&pool, "documents").await, 0);
        assert_eq!(count(&pool, "authors").await, 0);
    }

    #[tokio::test]
    async fn independent_resolvers_do_not_duplicate_rows() {
        let (_dir, pool) = pool().await;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let pool = pool.clone();
            tasks.spawn(async move {
                let authors = authors();
                let dlcs = dlcs();
                let mut resolver = EntityResolver::new(pool);
                resolver
                    .resolve(&DocumentIdentity {
                        handle: "1721.1/400",
                        title: Some("Shared"),
                        authors: &authors,
                        dlcs: &dlcs,
                    })
                    .await
                    .unwrap()
            });
        }

        let ids: Vec<i64> = tasks.join_all().await;
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(count(&pool, "documents").await, 1);
        assert_eq!(count(&pool, "authors").await, 2);
    }

    #[test]
    fn identity_requires_handle() {
        let record = EnrichedRecord {
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
            handle: None,
            title: None,
            dlcs: Vec::new(),
            authors: Vec::new(),
        };
        assert!(DocumentIdentity::from_record(&record).is_none());
    }
}
