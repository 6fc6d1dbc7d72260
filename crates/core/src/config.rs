//! 설정 관리 — oastats.toml 파싱 및 런타임 설정
//!
//! [`OastatsConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`OASTATS_SEARCH_SOLR_URL=http://...` 형식)
//! 3. 설정 파일 (`oastats.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), oastats_core::error::OastatsError> {
//! use oastats_core::config::OastatsConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = OastatsConfig::load("oastats.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = OastatsConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, OastatsError};

/// 레코드 저장소 기본 배치 크기
pub const DEFAULT_RECORD_BATCH_SIZE: usize = 1_000;

/// 검색 색인 기본 배치 크기
pub const DEFAULT_INDEX_BATCH_SIZE: usize = 10_000;

/// 요약 작업자 수 상한
const MAX_WORKERS: usize = 64;

/// OA Stats 통합 설정
///
/// `oastats.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 크레이트는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OastatsConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 로그 파이프라인 설정
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// 저장소 설정
    #[serde(default)]
    pub storage: StorageSection,
    /// 검색 색인 및 요약 설정
    #[serde(default)]
    pub search: SearchSection,
}

impl OastatsConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, OastatsError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, OastatsError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OastatsError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                OastatsError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, OastatsError> {
        toml::from_str(toml_str).map_err(|e| {
            OastatsError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `OASTATS_{SECTION}_{FIELD}`
    /// 예: `OASTATS_PIPELINE_GEOIP_DB=/data/GeoLite2-Country.mmdb`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "OASTATS_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "OASTATS_GENERAL_LOG_FORMAT");

        // Pipeline
        override_string(&mut self.pipeline.geoip_db, "OASTATS_PIPELINE_GEOIP_DB");
        override_string(
            &mut self.pipeline.identity_service,
            "OASTATS_PIPELINE_IDENTITY_SERVICE",
        );
        override_csv(
            &mut self.pipeline.excluded_ips,
            "OASTATS_PIPELINE_EXCLUDED_IPS",
        );
        override_parsed(
            &mut self.pipeline.on_upstream_error,
            "OASTATS_PIPELINE_ON_UPSTREAM_ERROR",
        );
        override_parsed(
            &mut self.pipeline.request_timeout_secs,
            "OASTATS_PIPELINE_REQUEST_TIMEOUT_SECS",
        );

        // Storage
        override_string(&mut self.storage.records_db, "OASTATS_STORAGE_RECORDS_DB");
        override_string(
            &mut self.storage.relational_db,
            "OASTATS_STORAGE_RELATIONAL_DB",
        );
        override_parsed(
            &mut self.storage.record_batch_size,
            "OASTATS_STORAGE_RECORD_BATCH_SIZE",
        );

        // Search
        override_string(&mut self.search.solr_url, "OASTATS_SEARCH_SOLR_URL");
        override_parsed(
            &mut self.search.index_batch_size,
            "OASTATS_SEARCH_INDEX_BATCH_SIZE",
        );
        override_string(&mut self.search.facet_start, "OASTATS_SEARCH_FACET_START");
        override_string(&mut self.search.facet_end, "OASTATS_SEARCH_FACET_END");
        override_parsed(&mut self.search.workers, "OASTATS_SEARCH_WORKERS");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), OastatsError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if !self.pipeline.identity_service.starts_with("http://")
            && !self.pipeline.identity_service.starts_with("https://")
        {
            return Err(invalid(
                "pipeline.identity_service",
                "must be an http(s) URL".to_owned(),
            ));
        }

        if self.pipeline.request_timeout_secs == 0 {
            return Err(invalid(
                "pipeline.request_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.storage.records_db.is_empty() {
            return Err(invalid(
                "storage.records_db",
                "must not be empty".to_owned(),
            ));
        }

        if self.storage.relational_db.is_empty() {
            return Err(invalid(
                "storage.relational_db",
                "must not be empty".to_owned(),
            ));
        }

        if self.storage.record_batch_size == 0 {
            return Err(invalid(
                "storage.record_batch_size",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.search.index_batch_size == 0 {
            return Err(invalid(
                "search.index_batch_size",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.search.workers == 0 || self.search.workers > MAX_WORKERS {
            return Err(invalid(
                "search.workers",
                format!("must be 1-{MAX_WORKERS}"),
            ));
        }

        if self.search.facet_start.is_empty() || self.search.facet_end.is_empty() {
            return Err(invalid(
                "search.facet_start",
                "facet range bounds must not be empty".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> OastatsError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 식별 서비스 전송 실패 시 처리 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamPolicy {
    /// 로그를 남기고 해당 라인을 건너뜀 (기본값)
    #[default]
    Skip,
    /// 실행 전체를 중단
    Abort,
}

impl FromStr for UpstreamPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown upstream policy '{other}'")),
        }
    }
}

impl fmt::Display for UpstreamPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("skip"),
            Self::Abort => f.write_str("abort"),
        }
    }
}

/// 로그 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// GeoLite2-Country mmdb 경로
    pub geoip_db: String,
    /// 식별(메타데이터) 서비스 URL
    pub identity_service: String,
    /// 제외할 클라이언트 IP 목록
    pub excluded_ips: Vec<String>,
    /// 식별 서비스 전송 실패 시 처리 정책
    pub on_upstream_error: UpstreamPolicy,
    /// 식별 서비스 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            geoip_db: "GeoLite2-Country.mmdb".to_owned(),
            identity_service: "https://dspace.mit.edu/ws/oastats".to_owned(),
            excluded_ips: vec![
                "127.0.0.1".to_owned(),
                "::1".to_owned(),
                "18.7.27.25".to_owned(),
            ],
            on_upstream_error: UpstreamPolicy::Skip,
            request_timeout_secs: 30,
        }
    }
}

/// 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// 보강 레코드와 요약 컬렉션을 담는 SQLite 파일 경로
    pub records_db: String,
    /// 정규화 엔티티 테이블을 담는 SQLite 파일 경로
    pub relational_db: String,
    /// 레코드 저장소 배치 크기
    pub record_batch_size: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            records_db: "./data/records.db".to_owned(),
            relational_db: "./data/oastats.db".to_owned(),
            record_batch_size: DEFAULT_RECORD_BATCH_SIZE,
        }
    }
}

/// 검색 색인 및 요약 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Solr 코어 URL
    pub solr_url: String,
    /// 색인 배치 크기
    pub index_batch_size: usize,
    /// 날짜 facet 시작 시각
    pub facet_start: String,
    /// 날짜 facet 종료 시각 (Solr 날짜 수식 허용, 예: `NOW`)
    pub facet_end: String,
    /// 요약 계산 동시 작업자 수
    pub workers: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            solr_url: "http://localhost:8983/solr/oastats".to_owned(),
            index_batch_size: DEFAULT_INDEX_BATCH_SIZE,
            facet_start: "2010-08-01T00:00:00Z".to_owned(),
            facet_end: "NOW".to_owned(),
            workers: 4,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T>(target: &mut T, env_key: &str)
where
    T: FromStr,
{
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse value from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = OastatsConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.storage.record_batch_size, 1_000);
        assert_eq!(config.search.index_batch_size, 10_000);
        assert_eq!(config.pipeline.on_upstream_error, UpstreamPolicy::Skip);
        assert!(
            config
                .pipeline
                .excluded_ips
                .contains(&"18.7.27.25".to_owned())
        );
    }

    #[test]
    fn default_config_passes_validation() {
        OastatsConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = OastatsConfig::parse("").unwrap();
        assert_eq!(config.search.facet_end, "NOW");
        assert_eq!(config.search.workers, 4);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[pipeline]
on_upstream_error = "abort"

[search]
workers = 8
"#;
        let config = OastatsConfig::parse(toml).unwrap();
        assert_eq!(config.pipeline.on_upstream_error, UpstreamPolicy::Abort);
        assert_eq!(config.search.workers, 8);
        // 지정하지 않은 필드는 기본값 유지
        assert_eq!(config.search.index_batch_size, 10_000);
        assert_eq!(config.general.log_format, "pretty");
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = OastatsConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            OastatsError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn unknown_upstream_policy_is_rejected() {
        let result = OastatsConfig::parse("[pipeline]\non_upstream_error = \"retry\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = OastatsConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_non_http_identity_service() {
        let mut config = OastatsConfig::default();
        config.pipeline.identity_service = "ftp://example.com".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("identity_service"));
    }

    #[test]
    fn validate_rejects_zero_batch_sizes() {
        let mut config = OastatsConfig::default();
        config.storage.record_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = OastatsConfig::default();
        config.search.index_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_worker_count_out_of_range() {
        let mut config = OastatsConfig::default();
        config.search.workers = 0;
        assert!(config.validate().is_err());
        config.search.workers = 65;
        assert!(config.validate().is_err());
        config.search.workers = 64;
        config.validate().unwrap();
    }

    #[test]
    fn upstream_policy_from_str() {
        assert_eq!("skip".parse::<UpstreamPolicy>(), Ok(UpstreamPolicy::Skip));
        assert_eq!(" ABORT ".parse::<UpstreamPolicy>(), Ok(UpstreamPolicy::Abort));
        assert!("retry".parse::<UpstreamPolicy>().is_err());
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_OASTATS_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = OastatsConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = OastatsConfig::parse(&toml_str).unwrap();
        assert_eq!(config.search.solr_url, parsed.search.solr_url);
        assert_eq!(config.pipeline.excluded_ips, parsed.pipeline.excluded_ips);
        assert_eq!(
            config.pipeline.on_upstream_error,
            parsed.pipeline.on_upstream_error
        );
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = OastatsConfig::from_file("/nonexistent/path/oastats.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OastatsError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
