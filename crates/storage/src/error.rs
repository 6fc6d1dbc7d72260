//! 저장소 에러 타입
//!
//! [`StorageError`]는 관계형 DB, 레코드 컬렉션, 검색 색인, CSV 출력에서
//! 발생하는 에러를 표현합니다. 모두 실행을 중단하는 치명적 분류입니다.

use oastats_core::error::{ErrorCategory, OastatsError};

/// 저장소 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// SQLite 에러
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 검색 색인 HTTP 전송 에러
    #[error("search index request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 검색 색인이 에러 응답을 반환
    #[error("search index error (HTTP {status}): {reason}")]
    Search {
        /// HTTP 상태 코드
        status: u16,
        /// 응답 본문 요약
        reason: String,
    },

    /// JSON 직렬화/역직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV 출력 에러
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 응답/행 해석 에러
    #[error("unexpected result: {0}")]
    Query(String),
}

impl StorageError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

impl From<StorageError> for OastatsError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => OastatsError::Io(e),
            other => OastatsError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_error_display() {
        let err = StorageError::Search {
            status: 400,
            reason: "undefined field foo".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("undefined field foo"));
        assert!(err.category().is_fatal());
    }

    #[test]
    fn converts_to_top_level_storage() {
        let err: OastatsError = StorageError::Query("no row".to_owned()).into();
        assert!(matches!(err, OastatsError::Storage(_)));
    }

    #[test]
    fn io_stays_io() {
        let err: OastatsError = StorageError::Io(std::io::Error::other("disk full")).into();
        assert!(matches!(err, OastatsError::Io(_)));
    }
}
