//! GeoIP 국가 조회
//!
//! [`GeoLookup`]은 IP 하나에 대해 alpha-2 국가 코드와 익명 프록시/위성 제공자
//! 여부를 돌려주는 조회 계층입니다. [`country_code`]가 그 결과를 레코드에 기록할
//! alpha-3 코드로 매핑합니다.
//!
//! # 매핑 규칙
//! - 실제 국가 코드 -> alpha-3 (`AU` -> `AUS`)
//! - 익명 프록시 / 위성 제공자 -> `XXX`
//! - 조회 실패 (주소 없음, 사설/루프백 주소) -> `XXX`
//! - 표준 표에 없는 alpha-2 (예: `XK`, 예약 코드 `XA`/`XS`/`XX`) -> `XXX`

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use maxminddb::{MaxMindDBError, Reader, geoip2};
use tracing::{debug, warn};

use crate::error::LogPipelineError;

/// 국가를 특정할 수 없을 때 기록하는 값
pub const UNKNOWN_COUNTRY: &str = "XXX";

/// 단일 IP 조회 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoRecord {
    /// ISO 3166-1 alpha-2 국가 코드
    pub country_iso_alpha2: Option<String>,
    /// 익명 프록시 여부
    pub is_anonymous_proxy: bool,
    /// 위성 인터넷 제공자 여부
    pub is_satellite_provider: bool,
}

impl GeoRecord {
    /// 국가 코드만 있는 조회 결과
    pub fn country(alpha2: impl Into<String>) -> Self {
        Self {
            country_iso_alpha2: Some(alpha2.into()),
            ..Self::default()
        }
    }
}

/// GeoIP 조회 계층
///
/// 주소가 데이터베이스에 없으면 `Ok(None)`을 반환합니다.
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, LogPipelineError>;
}

/// MaxMind GeoLite2/GeoIP2 Country 데이터베이스 조회기
pub struct MaxMindGeoLookup {
    reader: Reader<Vec<u8>>,
}

impl MaxMindGeoLookup {
    /// mmdb 파일을 열어 조회기를 생성합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogPipelineError> {
        let path = path.as_ref();
        let reader = Reader::open_readfile(path)
            .map_err(|e| LogPipelineError::GeoIp(format!("{}: {e}", path.display())))?;
        debug!(
            path = %path.display(),
            database_type = reader.metadata.database_type.as_str(),
            "opened geoip database"
        );
        Ok(Self { reader })
    }
}

impl GeoLookup for MaxMindGeoLookup {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, LogPipelineError> {
        match self.reader.lookup::<geoip2::Country>(ip) {
            Ok(found) => {
                let traits = found.traits.as_ref();
                Ok(Some(GeoRecord {
                    country_iso_alpha2: found
                        .country
                        .as_ref()
                        .and_then(|c| c.iso_code)
                        .map(str::to_owned),
                    is_anonymous_proxy: traits
                        .and_then(|t| t.is_anonymous_proxy)
                        .unwrap_or(false),
                    is_satellite_provider: traits
                        .and_then(|t| t.is_satellite_provider)
                        .unwrap_or(false),
                }))
            }
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(LogPipelineError::GeoIp(format!("lookup {ip}: {e}"))),
        }
    }
}

/// 고정된 IP -> 조회 결과 표
///
/// 테스트와 오프라인 실행에서 mmdb 파일 대신 사용합니다.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoLookup {
    entries: HashMap<IpAddr, GeoRecord>,
}

impl StaticGeoLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// 항목을 추가합니다.
    pub fn with(mut self, ip: IpAddr, record: GeoRecord) -> Self {
        self.entries.insert(ip, record);
        self
    }

    /// 국가 코드 항목을 추가합니다.
    pub fn with_country(self, ip: IpAddr, alpha2: &str) -> Self {
        self.with(ip, GeoRecord::country(alpha2))
    }
}

impl GeoLookup for StaticGeoLookup {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, LogPipelineError> {
        Ok(self.entries.get(&ip).cloned())
    }
}

/// 조회 결과를 레코드에 기록할 alpha-3 코드로 매핑합니다.
pub fn to_alpha3(record: Option<&GeoRecord>) -> String {
    let Some(record) = record else {
        return UNKNOWN_COUNTRY.to_owned();
    };
    if record.is_anonymous_proxy || record.is_satellite_provider {
        return UNKNOWN_COUNTRY.to_owned();
    }
    let Some(alpha2) = record.country_iso_alpha2.as_deref() else {
        return UNKNOWN_COUNTRY.to_owned();
    };

    let alpha2 = alpha2.trim().to_ascii_uppercase();
    if matches!(alpha2.as_str(), "XA" | "XS" | "XX") {
        return UNKNOWN_COUNTRY.to_owned();
    }
    match isocountry::CountryCode::for_alpha2(&alpha2) {
        Ok(code) => code.alpha3().to_owned(),
        Err(_) => {
            debug!(alpha2 = alpha2.as_str(), "unknown alpha-2 code, folding to XXX");
            UNKNOWN_COUNTRY.to_owned()
        }
    }
}

/// IP의 alpha-3 국가 코드를 조회합니다.
///
/// 조회 계층 자체의 실패도 `XXX`로 접고 경고만 남깁니다.
pub fn country_code<G: GeoLookup + ?Sized>(geo: &G, ip: IpAddr) -> String {
    match geo.lookup(ip) {
        Ok(found) => to_alpha3(found.as_ref()),
        Err(e) => {
            warn!(ip = %ip, error = %e, "geoip lookup failed");
            UNKNOWN_COUNTRY.to_owned()
        }
    }
}
