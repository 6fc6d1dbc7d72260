//! 에러 타입 — 도메인별 에러 정의 및 운영자용 분류 태그

use std::fmt;

/// OA Stats 최상위 에러 타입
///
/// 각 크레이트의 도메인 에러(`LogPipelineError`, `StorageError`)는
/// `From` 변환을 통해 이 타입으로 전파됩니다.
#[derive(Debug, thiserror::Error)]
pub enum OastatsError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// 저장소 에러
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OastatsError {
    /// 에러의 분류 태그를 반환합니다.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::Pipeline(_) => ErrorCategory::UpstreamError,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
        }
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 처리 중 발생한 스킵/에러 이벤트의 분류
///
/// 로그 필드(`category`)와 메트릭 레이블에 그대로 사용되어
/// 운영자가 원인별로 로그량을 나눠 볼 수 있게 합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCategory {
    /// 문법에는 맞지만 내용이 잘못된 라인 (잘못된 IP, UTF-8 아님)
    MalformedLine,
    /// 필터 체인에서 탈락한 레코드
    Filtered,
    /// 문법에 맞지 않는 라인 (관심 대상 아님)
    Unmatched,
    /// 타임스탬프 파싱 실패
    BadTimestamp,
    /// 식별 서비스가 not-found/실패를 응답
    NotFound,
    /// 식별 서비스 전송 계층 실패
    UpstreamError,
    /// 저장소 실패
    Storage,
    /// 설정 오류
    Config,
}

impl ErrorCategory {
    /// 로그/메트릭에 쓰이는 문자열 태그
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedLine => "malformed_line",
            Self::Filtered => "filtered",
            Self::Unmatched => "unmatched",
            Self::BadTimestamp => "bad_timestamp",
            Self::NotFound => "not_found",
            Self::UpstreamError => "upstream_error",
            Self::Storage => "storage",
            Self::Config => "config",
        }
    }

    /// 실행 전체를 중단해야 하는 분류인지 여부
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage | Self::Config)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "search.workers".to_owned(),
            reason: "must be 1-64".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("search.workers"));
        assert!(msg.contains("must be 1-64"));
    }

    #[test]
    fn config_error_converts_to_top_level() {
        let err: OastatsError = ConfigError::ParseFailed {
            reason: "bad toml".to_owned(),
        }
        .into();
        assert!(matches!(err, OastatsError::Config(_)));
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn category_tags_are_stable() {
        assert_eq!(ErrorCategory::MalformedLine.as_str(), "malformed_line");
        assert_eq!(ErrorCategory::UpstreamError.to_string(), "upstream_error");
        assert_eq!(ErrorCategory::NotFound.as_str(), "not_found");
    }

    #[test]
    fn only_storage_and_config_are_fatal() {
        assert!(ErrorCategory::Storage.is_fatal());
        assert!(ErrorCategory::Config.is_fatal());
        assert!(!ErrorCategory::MalformedLine.is_fatal());
        assert!(!ErrorCategory::UpstreamError.is_fatal());
        assert!(!ErrorCategory::Filtered.is_fatal());
    }
}
