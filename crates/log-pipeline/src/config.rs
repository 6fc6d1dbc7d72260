//! 로그 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`PipelineSection`](oastats_core::config::PipelineSection)을
//! 기반으로 실행 단위 설정(대상 월)을 더한 것입니다.
//!
//! # 사용 예시
//! ```ignore
//! use oastats_core::config::OastatsConfig;
//! use oastats_log_pipeline::config::PipelineConfig;
//!
//! let core_config = OastatsConfig::default();
//! let config = PipelineConfig::from_core(&core_config.pipeline)
//!     .with_months(vec!["Jan/2013".to_owned()]);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use oastats_core::config::{PipelineSection, UpstreamPolicy};

use crate::error::LogPipelineError;
use crate::filter::TargetMonth;

/// 로그 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// GeoLite2-Country mmdb 경로
    pub geoip_db: String,
    /// 식별 서비스 URL
    pub identity_service: String,
    /// 제외할 클라이언트 IP
    pub excluded_ips: Vec<String>,
    /// 식별 서비스 전송 실패 시 정책
    pub on_upstream_error: UpstreamPolicy,
    /// 식별 서비스 요청 타임아웃 (초)
    pub request_timeout_secs: u64,

    // --- 실행 단위 설정 (core에 없는 필드) ---
    /// 대상 연-월 (`Mon/YYYY` 또는 `Mon-YYYY`). 비어 있으면 전체
    pub months: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&PipelineSection::default())
    }
}

impl PipelineConfig {
    /// core의 `PipelineSection`에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &PipelineSection) -> Self {
        Self {
            geoip_db: core.geoip_db.clone(),
            identity_service: core.identity_service.clone(),
            excluded_ips: core.excluded_ips.clone(),
            on_upstream_error: core.on_upstream_error,
            request_timeout_secs: core.request_timeout_secs,
            months: Vec::new(),
        }
    }

    /// 대상 월을 설정합니다.
    pub fn with_months(mut self, months: Vec<String>) -> Self {
        self.months = months;
        self
    }

    /// 식별 서비스 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 대상 월을 파싱하고 정규화합니다.
    pub fn target_months(&self) -> Result<Vec<TargetMonth>, LogPipelineError> {
        self.months.iter().map(|m| TargetMonth::parse(m)).collect()
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        const MAX_TIMEOUT_SECS: u64 = 600;

        if self.geoip_db.is_empty() {
            return Err(LogPipelineError::Config {
                field: "geoip_db".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.request_timeout_secs == 0 || self.request_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(LogPipelineError::Config {
                field: "request_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_TIMEOUT_SECS}"),
            });
        }

        if let Some(ip) = self
            .excluded_ips
            .iter()
            .find(|ip| ip.parse::<std::net::IpAddr>().is_err())
        {
            return Err(LogPipelineError::Config {
                field: "excluded_ips".to_owned(),
                reason: format!("'{ip}' is not an IP address"),
            });
        }

        self.target_months()?;
        Ok(())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geoip_db(mut self, path: impl Into<String>) -> Self {
        self.config.geoip_db = path.into();
        self
    }

    pub fn identity_service(mut self, url: impl Into<String>) -> Self {
        self.config.identity_service = url.into();
        self
    }

    pub fn excluded_ips(mut self, ips: Vec<String>) -> Self {
        self.config.excluded_ips = ips;
        self
    }

    pub fn on_upstream_error(mut self, policy: UpstreamPolicy) -> Self {
        self.config.on_upstream_error = policy;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn months(mut self, months: Vec<String>) -> Self {
        self.config.months = months;
        self
    }

    /// 설정을 검증하고 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.excluded_ips.len(), 3);
        assert!(config.months.is_empty());
    }

    #[test]
    fn from_core_copies_fields() {
        let core = PipelineSection {
            on_upstream_error: UpstreamPolicy::Abort,
            request_timeout_secs: 5,
            ..PipelineSection::default()
        };
        let config = PipelineConfig::from_core(&core);
        assert_eq!(config.on_upstream_error, UpstreamPolicy::Abort);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn months_are_normalised() {
        let config = PipelineConfig::default()
            .with_months(vec!["jan-2013".to_owned(), "Feb/2013".to_owned()]);
        let months = config.target_months().unwrap();
        assert_eq!(months[0].as_str(), "Jan/2013");
        assert_eq!(months[1].as_str(), "Feb/2013");
    }

    #[test]
    fn builder_rejects_bad_month() {
        let result = PipelineConfigBuilder::new()
            .months(vec!["2013-01".to_owned()])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_bad_excluded_ip() {
        let result = PipelineConfigBuilder::new()
            .excluded_ips(vec!["localhost".to_owned()])
            .build();
        assert!(matches!(result, Err(LogPipelineError::Config { .. })));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        assert!(
            PipelineConfigBuilder::new()
                .request_timeout_secs(0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn builder_sets_fields() {
        let config = PipelineConfigBuilder::new()
            .geoip_db("/tmp/geo.mmdb")
            .identity_service("http://localhost:9000/ws")
            .on_upstream_error(UpstreamPolicy::Abort)
            .build()
            .unwrap();
        assert_eq!(config.geoip_db, "/tmp/geo.mmdb");
        assert_eq!(config.identity_service, "http://localhost:9000/ws");
        assert_eq!(config.on_upstream_error, UpstreamPolicy::Abort);
    }
}
