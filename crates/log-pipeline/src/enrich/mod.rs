//! 보강 단계
//!
//! 파싱된 레코드에 파생 필드를 더하는 변환들입니다.
//!
//! - [`timestamp`]: Apache 타임스탬프 -> ISO-8601 (원래 UTC 오프셋 유지)
//! - [`geoip`]: 클라이언트 IP -> ISO alpha-3 국가 코드 또는 `XXX`
//! - [`identity`]: 핸들 -> 제목/부서/저자 메타데이터 (실행 단위 메모이즈)

pub mod geoip;
pub mod identity;
pub mod timestamp;

pub use geoip::{GeoLookup, GeoRecord, MaxMindGeoLookup, StaticGeoLookup, UNKNOWN_COUNTRY};
pub use identity::{HttpIdentityService, IdentityCache, IdentityResponse, IdentityService};
pub use timestamp::to_iso8601;
