//! 요청 사실(request fact) 출력
//!
//! 보강 레코드 하나와 해석된 문서 ID로 [`RequestFact`]를 만들고,
//! CSV 한 줄로 출력하거나 `requests` 테이블에 배치 삽입합니다.
//!
//! CSV 필드 순서: `status, country, url, referer, user_agent, iso_datetime, document_id`

use csv::{QuoteStyle, Terminator, WriterBuilder};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use oastats_core::types::EnrichedRecord;

use crate::error::StorageError;
use crate::writer::BatchSink;

/// SQLite 바인드 파라미터 상한(32766)을 넘지 않는 다중 행 INSERT 크기
const INSERT_CHUNK: usize = 1_000;

/// `requests` 테이블의 한 행
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFact {
    pub status: String,
    pub country: String,
    pub url: String,
    pub referer: String,
    pub user_agent: String,
    pub datetime: String,
    pub document_id: i64,
}

impl RequestFact {
    /// 보강 레코드와 문서 ID로 요청 사실을 만듭니다.
    pub fn from_record(record: &EnrichedRecord, document_id: i64) -> Self {
        Self {
            status: record.status.clone(),
            country: record.country.clone(),
            url: record.request.clone(),
            referer: record.referer.clone(),
            user_agent: record.user_agent.clone(),
            datetime: record.time.clone(),
            document_id,
        }
    }

    /// CSV 한 줄 (줄바꿈 없음)
    pub fn to_csv(&self) -> Result<String, StorageError> {
        let document_id = self.document_id.to_string();
        to_csv([
            self.status.as_str(),
            self.country.as_str(),
            self.url.as_str(),
            self.referer.as_str(),
            self.user_agent.as_str(),
            self.datetime.as_str(),
            document_id.as_str(),
        ])
    }
}

/// PostgreSQL `COPY`의 데이터 끝 표시
const END_OF_DATA: &[u8] = b"\\.";

/// 필드 목록을 RFC 4180 스타일 CSV 한 줄로 만듭니다 (줄바꿈 없음).
///
/// 쉼표, 큰따옴표, 줄바꿈을 포함한 필드와 `\.` 하나로 된 필드만 따옴표로 감싸고
/// 내부 따옴표는 두 번 씁니다.
pub fn to_csv<I, F>(fields: I) -> Result<String, StorageError>
where
    I: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
{
    let quoted = fields
        .into_iter()
        .map(|field| quote_field(field.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quoted.join(","))
}

fn quote_field(field: &[u8]) -> Result<String, StorageError> {
    if field.is_empty() {
        return Ok(String::new());
    }
    if field == END_OF_DATA {
        return Ok("\"\\.\"".to_owned());
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record([field])?;
    let bytes = writer
        .into_inner()
        .map_err(|e| StorageError::Io(e.into_error()))?;

    let mut quoted = String::from_utf8(bytes)
        .map_err(|e| StorageError::Query(format!("csv output is not UTF-8: {e}")))?;
    if quoted.ends_with('\n') {
        quoted.pop();
    }
    Ok(quoted)
}

/// 요청 사실을 CSV 줄로 쓰는 싱크
pub struct CsvSink<W> {
    out: W,
}

impl<W: AsyncWrite + Unpin + Send> CsvSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: AsyncWrite + Unpin + Send> BatchSink<RequestFact> for CsvSink<W> {
    async fn send_batch(&mut self, batch: &[RequestFact]) -> Result<(), StorageError> {
        let mut chunk = String::new();
        for fact in batch {
            chunk.push_str(&fact.to_csv()?);
            chunk.push('\n');
        }
        self.out.write_all(chunk.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "csv"
    }
}

/// `requests` 테이블 싱크
pub struct RequestTableSink {
    pool: SqlitePool,
}

impl RequestTableSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl BatchSink<RequestFact> for RequestTableSink {
    async fn send_batch(&mut self, batch: &[RequestFact]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for chunk in batch.chunks(INSERT_CHUNK) {
            let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO requests (status, country, url, referer, user_agent, datetime, document_id) ",
            );
            query.push_values(chunk, |mut row, fact| {
                row.push_bind(&fact.status)
                    .push_bind(&fact.country)
                    .push_bind(&fact.url)
                    .push_bind(&fact.referer)
                    .push_bind(&fact.user_agent)
                    .push_bind(&fact.datetime)
                    .push_bind(fact.document_id);
            });
            query.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "requests"
    }
}
