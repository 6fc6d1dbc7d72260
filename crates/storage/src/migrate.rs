//! 스키마 생성
//!
//! 모든 문장은 `IF NOT EXISTS`로 작성되어 반복 실행해도 안전합니다.
//!
//! - 관계형 DB: `authors`, `dlcs`, `documents`, 조인 테이블 두 개, `requests`
//! - 레코드 DB: `records`, `summary`, `summary_staging`

use sqlx::SqlitePool;
use tracing::info;

use crate::error::StorageError;

const RELATIONAL_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS authors (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        mit_id TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dlcs (
        id INTEGER PRIMARY KEY,
        display_name TEXT NOT NULL,
        canonical_name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY,
        handle TEXT NOT NULL UNIQUE,
        title TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents_authors (
        id INTEGER PRIMARY KEY,
        document_id INTEGER NOT NULL REFERENCES documents(id),
        author_id INTEGER NOT NULL REFERENCES authors(id),
        UNIQUE(document_id, author_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_author_document ON documents_authors(author_id, document_id)",
    r#"
    CREATE TABLE IF NOT EXISTS documents_dlcs (
        id INTEGER PRIMARY KEY,
        document_id INTEGER NOT NULL REFERENCES documents(id),
        dlc_id INTEGER NOT NULL REFERENCES dlcs(id),
        UNIQUE(document_id, dlc_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_dlc_document ON documents_dlcs(dlc_id, document_id)",
    r#"
    CREATE TABLE IF NOT EXISTS requests (
        id INTEGER PRIMARY KEY,
        status INTEGER,
        country TEXT,
        url TEXT,
        referer TEXT,
        user_agent TEXT,
        datetime TEXT,
        document_id INTEGER NOT NULL REFERENCES documents(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_requests_document ON requests(document_id)",
];

const RECORDS_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        handle TEXT,
        time TEXT NOT NULL,
        body TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_records_handle ON records(handle)",
    r#"
    CREATE TABLE IF NOT EXISTS summary (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        body TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS summary_staging (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        body TEXT NOT NULL
    )
    "#,
];

/// 관계형 엔티티 테이블과 요청 사실 테이블을 생성합니다.
pub async fn migrate_relational(pool: &SqlitePool) -> Result<(), StorageError> {
    for statement in RELATIONAL_SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(tables = 6, "relational schema ready");
    Ok(())
}

/// 보강 레코드 컬렉션과 요약 컬렉션 테이블을 생성합니다.
pub async fn migrate_records(pool: &SqlitePool) -> Result<(), StorageError> {
    for statement in RECORDS_SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(tables = 3, "records schema ready");
    Ok(())
}
