#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`parser`]: 고정 문법 접근 로그 라인 파서
//! - [`filter`]: 상태/메서드/경로/IP/봇/날짜 필터 체인
//! - [`enrich`]: 타임스탬프, GeoIP 국가, 식별 서비스 보강 단계
//! - [`pipeline`]: 단계 조합 및 지연 평가 레코드 스트림
//! - [`config`]: 파이프라인 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! reader -> FilterChain(line) -> LineParser -> FilterChain(record)
//!        -> timestamp -> GeoLookup -> IdentityCache -> EnrichedRecord
//! ```

pub mod config;
pub mod enrich;
pub mod error;
pub mod filter;
pub mod parser;
pub mod pipeline;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{LogPipeline, LogPipelineBuilder, PipelineStats, RecordStream, continue_after};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 파서 / 필터
pub use filter::{FilterChain, FilterKind, TargetMonth};
pub use parser::{LineParser, ParsedRecord};

// 보강
pub use enrich::{
    GeoLookup, GeoRecord, HttpIdentityService, IdentityCache, IdentityResponse, IdentityService,
    MaxMindGeoLookup, StaticGeoLookup,
};
