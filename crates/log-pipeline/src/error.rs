//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 파이프라인이 호출자에게 전달하는 "구분 가능한" 에러만 표현합니다.
//! 필터 탈락, 식별 서비스의 not-found, 타임스탬프 파싱 실패는 에러가 아니라
//! 스킵으로 처리되며 이 타입에 나타나지 않습니다.
//!
//! `From<LogPipelineError> for OastatsError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use oastats_core::error::{ConfigError, ErrorCategory, OastatsError};

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 문법에는 맞지만 내용이 잘못된 라인
    #[error("malformed line: {reason}")]
    MalformedLine {
        /// 실패 사유
        reason: String,
    },

    /// 식별 서비스 전송 계층 실패 (네트워크 에러, 2xx 이외 응답, 잘못된 본문)
    #[error("identity service error for handle '{handle}': {reason}")]
    Upstream {
        /// 조회하던 핸들
        handle: String,
        /// 실패 사유
        reason: String,
    },

    /// GeoIP 데이터베이스 열기 실패
    #[error("geoip error: {0}")]
    GeoIp(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 입력 I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl LogPipelineError {
    /// 운영자용 분류 태그를 반환합니다.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedLine { .. } => ErrorCategory::MalformedLine,
            Self::Upstream { .. } => ErrorCategory::UpstreamError,
            Self::GeoIp(_) | Self::Config { .. } | Self::Regex(_) => ErrorCategory::Config,
            Self::Io(_) => ErrorCategory::Storage,
        }
    }

    /// 다음 라인으로 계속 진행해도 되는 에러인지 여부
    ///
    /// 전송 계층 실패는 호출자 정책에 따라 결정되므로 여기서는 `false`입니다.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::MalformedLine { .. })
    }
}

impl From<LogPipelineError> for OastatsError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Config { field, reason } => {
                OastatsError::Config(ConfigError::InvalidValue { field, reason })
            }
            LogPipelineError::GeoIp(reason) => OastatsError::Config(ConfigError::InvalidValue {
                field: "pipeline.geoip_db".to_owned(),
                reason,
            }),
            LogPipelineError::Io(e) => OastatsError::Io(e),
            other => OastatsError::Pipeline(other.to_string()),
        }
    }
}
