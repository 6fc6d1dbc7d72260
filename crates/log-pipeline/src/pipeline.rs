//! 파이프라인 구성 -- 원시 라인 시퀀스를 보강 레코드 시퀀스로 변환합니다.
//!
//! # 단계 순서 (고정)
//! ```text
//! method -> date -> client IP -> parse -> status -> path -> bot
//!        -> timestamp (unparsable: drop) -> country -> identity (not-found: drop)
//! ```
//!
//! 라인 하나가 모든 단계를 통과해 소비된 뒤에야 다음 라인을 읽습니다.
//! 탈락한 라인은 [`ErrorCategory`] 태그와 함께 집계되고, 호출자에게 전달되는 에러는
//! 잘못된 라인과 식별 서비스 전송 실패 두 종류뿐입니다.
//!
//! # 사용 예시
//! ```ignore
//! use oastats_log_pipeline::LogPipelineBuilder;
//!
//! let mut pipeline = LogPipelineBuilder::new(geo, identity)
//!     .months(months)
//!     .build()?;
//!
//! let mut records = pipeline.process(reader);
//! while let Some(result) = records.next().await {
//!     match result {
//!         Ok(record) => writer.write(record).await?,
//!         Err(e) if continue_after(&e, policy) => continue,
//!         Err(e) => return Err(e.into()),
//!     }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use metrics::counter;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Split};
use tracing::{debug, info, warn};

use oastats_core::config::UpstreamPolicy;
use oastats_core::error::ErrorCategory;
use oastats_core::metrics as m;
use oastats_core::types::EnrichedRecord;

use crate::config::PipelineConfig;
use crate::enrich::geoip::{GeoLookup, MaxMindGeoLookup, country_code};
use crate::enrich::identity::{HttpIdentityService, IdentityCache, IdentityService};
use crate::enrich::timestamp::to_iso8601;
use crate::error::LogPipelineError;
use crate::filter::{FilterChain, FilterKind, TargetMonth};
use crate::parser::LineParser;

/// 한 번의 실행 동안의 처리 통계
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// 읽은 라인 수
    pub lines_read: u64,
    /// 방출한 레코드 수
    pub emitted: u64,
    /// 분류별 스킵 수
    pub skipped: BTreeMap<ErrorCategory, u64>,
    /// 필터별 탈락 수
    pub filtered_by: HashMap<FilterKind, u64>,
}

impl PipelineStats {
    /// 분류별 스킵 수
    pub fn skipped(&self, category: ErrorCategory) -> u64 {
        self.skipped.get(&category).copied().unwrap_or(0)
    }

    /// 전체 스킵 수
    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }

    /// 통계를 하나의 info 이벤트로 기록합니다.
    pub fn log_summary(&self) {
        info!(
            lines_read = self.lines_read,
            emitted = self.emitted,
            filtered = self.skipped(ErrorCategory::Filtered),
            unmatched = self.skipped(ErrorCategory::Unmatched),
            malformed_line = self.skipped(ErrorCategory::MalformedLine),
            bad_timestamp = self.skipped(ErrorCategory::BadTimestamp),
            not_found = self.skipped(ErrorCategory::NotFound),
            upstream_error = self.skipped(ErrorCategory::UpstreamError),
            "pipeline run finished"
        );
    }

    fn skip(&mut self, category: ErrorCategory) {
        *self.skipped.entry(category).or_insert(0) += 1;
        counter!(m::PIPELINE_RECORDS_SKIPPED_TOTAL, m::LABEL_REASON => category.as_str())
            .increment(1);
    }

    fn filtered(&mut self, kind: FilterKind) {
        *self.filtered_by.entry(kind).or_insert(0) += 1;
        self.skip(ErrorCategory::Filtered);
    }
}

/// 에러 이후 다음 라인으로 계속 진행할지 결정합니다.
///
/// 잘못된 라인은 항상 계속하고, 식별 서비스 전송 실패는 정책을 따르며,
/// 그 밖의 에러(입력 I/O 등)는 중단합니다.
pub fn continue_after(err: &LogPipelineError, policy: UpstreamPolicy) -> bool {
    match err.category() {
        ErrorCategory::MalformedLine => true,
        ErrorCategory::UpstreamError => policy == UpstreamPolicy::Skip,
        _ => false,
    }
}

/// 로그 파이프라인
///
/// 협력자(GeoIP 조회, 식별 서비스)와 대상 월을 받아 생성되며,
/// 식별 서비스 캐시와 통계를 실행 단위로 소유합니다.
pub struct LogPipeline<G, S> {
    parser: LineParser,
    filters: FilterChain,
    geo: G,
    identity: IdentityCache<S>,
    stats: PipelineStats,
}

impl LogPipeline<MaxMindGeoLookup, HttpIdentityService> {
    /// 설정으로부터 실제 협력자(MaxMind DB, HTTP 식별 서비스)를 연결해 생성합니다.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, LogPipelineError> {
        config.validate()?;
        let geo = MaxMindGeoLookup::open(&config.geoip_db)?;
        let identity =
            HttpIdentityService::new(config.identity_service.clone(), config.request_timeout())?;
        LogPipelineBuilder::new(geo, identity)
            .excluded_ips(config.excluded_ips.clone())
            .months(config.target_months()?)
            .build()
    }
}

impl<G: GeoLookup, S: IdentityService> LogPipeline<G, S> {
    /// 현재까지의 통계
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// 식별 서비스 캐시
    pub fn identity_cache(&self) -> &IdentityCache<S> {
        &self.identity
    }

    /// 라인 하나를 모든 단계에 통과시킵니다.
    ///
    /// - `Ok(Some(record))`: 살아남은 레코드
    /// - `Ok(None)`: 필터 탈락, 문법 불일치, 타임스탬프 실패, not-found
    /// - `Err(_)`: 잘못된 라인 또는 식별 서비스 전송 실패
    pub async fn process_line(
        &mut self,
        line: &str,
    ) -> Result<Option<EnrichedRecord>, LogPipelineError> {
        self.stats.lines_read += 1;
        counter!(m::PIPELINE_LINES_READ_TOTAL).increment(1);

        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(kind) = self.filters.reject_line(line) {
            self.stats.filtered(kind);
            return Ok(None);
        }

        let parsed = match self.parser.parse(line) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                self.stats.skip(ErrorCategory::Unmatched);
                return Ok(None);
            }
            Err(e) => {
                self.stats.skip(e.category());
                warn!(category = e.category().as_str(), error = %e, "skipping line");
                return Err(e);
            }
        };

        if let Some(kind) = self.filters.reject_parsed(&parsed) {
            debug!(filter = kind.as_str(), request = parsed.request.as_str(), "record filtered");
            self.stats.filtered(kind);
            return Ok(None);
        }

        let Some(time) = to_iso8601(&parsed.time) else {
            warn!(
                category = ErrorCategory::BadTimestamp.as_str(),
                timestamp = parsed.time.as_str(),
                "unparsable timestamp, dropping record"
            );
            self.stats.skip(ErrorCategory::BadTimestamp);
            return Ok(None);
        };

        let ip: IpAddr = parsed.ip_address.parse().map_err(|_| {
            self.stats.skip(ErrorCategory::MalformedLine);
            LogPipelineError::MalformedLine {
                reason: format!("invalid client ip '{}'", parsed.ip_address),
            }
        })?;
        let country = country_code(&self.geo, ip);

        let Some(handle) = parsed.handle().map(str::to_owned) else {
            self.stats.filtered(FilterKind::Path);
            return Ok(None);
        };

        let identity = match self.identity.lookup(&handle).await {
            Ok(identity) => identity,
            Err(e) => {
                self.stats.skip(e.category());
                warn!(
                    category = e.category().as_str(),
                    handle = handle.as_str(),
                    error = %e,
                    "identity lookup failed"
                );
                return Err(e);
            }
        };
        if !identity.success {
            debug!(handle = handle.as_str(), "identity not found, dropping record");
            self.stats.skip(ErrorCategory::NotFound);
            return Ok(None);
        }

        self.stats.emitted += 1;
        counter!(m::PIPELINE_RECORDS_EMITTED_TOTAL).increment(1);

        Ok(Some(EnrichedRecord {
            ip_address: parsed.ip_address,
            time,
            method: parsed.method,
            request: parsed.request,
            http_version: parsed.http_version,
            status: parsed.status,
            bytes: parsed.bytes,
            referer: parsed.referer,
            user_agent: parsed.user_agent,
            country,
            handle: Some(identity.uri.clone().unwrap_or(handle)),
            title: identity.title.clone(),
            dlcs: identity.departments(),
            authors: identity.authors(),
        }))
    }

    /// 라인 소스를 지연 평가되는 단일 패스 레코드 스트림으로 감쌉니다.
    ///
    /// 소스는 한 번만 읽히며 스트림은 다시 시작할 수 없습니다.
    pub fn process<R>(&mut self, reader: R) -> RecordStream<'_, R, G, S>
    where
        R: AsyncBufRead + Unpin,
    {
        RecordStream {
            pipeline: self,
            lines: reader.split(b'\n'),
            finished: false,
        }
    }
}

/// [`LogPipeline::process`]가 반환하는 레코드 스트림
pub struct RecordStream<'a, R, G, S> {
    pipeline: &'a mut LogPipeline<G, S>,
    lines: Split<R>,
    finished: bool,
}

impl<R, G, S> RecordStream<'_, R, G, S>
where
    R: AsyncBufRead + Unpin,
    G: GeoLookup,
    S: IdentityService,
{
    /// 다음 레코드 또는 구분 가능한 에러를 반환합니다. 소스가 끝나면 `None`.
    ///
    /// 잘못된 라인 에러 뒤에도 스트림은 계속됩니다.
    /// 입력 I/O 에러 뒤에는 스트림이 끝납니다.
    pub async fn next(&mut self) -> Option<Result<EnrichedRecord, LogPipelineError>> {
        loop {
            if self.finished {
                return None;
            }

            let segment = match self.lines.next_segment().await {
                Ok(Some(segment)) => segment,
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(LogPipelineError::Io(e)));
                }
            };

            let line = match String::from_utf8(segment) {
                Ok(line) => line,
                Err(_) => {
                    self.pipeline.stats.lines_read += 1;
                    self.pipeline.stats.skip(ErrorCategory::MalformedLine);
                    return Some(Err(LogPipelineError::MalformedLine {
                        reason: "line is not valid UTF-8".to_owned(),
                    }));
                }
            };

            match self.pipeline.process_line(&line).await {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// 현재까지의 통계
    pub fn stats(&self) -> &PipelineStats {
        &self.pipeline.stats
    }
}

/// 파이프라인 빌더
pub struct LogPipelineBuilder<G, S> {
    geo: G,
    identity: S,
    excluded_ips: Vec<String>,
    months: Vec<TargetMonth>,
}

impl<G: GeoLookup, S: IdentityService> LogPipelineBuilder<G, S> {
    /// 협력자로 빌더를 생성합니다. 제외 IP는 기본 목록으로 시작합니다.
    pub fn new(geo: G, identity: S) -> Self {
        Self {
            geo,
            identity,
            excluded_ips: PipelineConfig::default().excluded_ips,
            months: Vec::new(),
        }
    }

    /// 제외할 클라이언트 IP를 설정합니다.
    pub fn excluded_ips(mut self, ips: Vec<String>) -> Self {
        self.excluded_ips = ips;
        self
    }

    /// 대상 월을 설정합니다. 비어 있으면 날짜 필터는 모두 통과시킵니다.
    pub fn months(mut self, months: Vec<TargetMonth>) -> Self {
        self.months = months;
        self
    }

    /// 파이프라인을 생성합니다.
    pub fn build(self) -> Result<LogPipeline<G, S>, LogPipelineError> {
        Ok(LogPipeline {
            parser: LineParser::new()?,
            filters: FilterChain::new(self.excluded_ips, self.months)?,
            geo: self.geo,
            identity: IdentityCache::new(self.identity),
            stats: PipelineStats::default(),
        })
    }
}
