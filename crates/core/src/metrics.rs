//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않은 경우 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `oastats_`
//! - 모듈명: `pipeline_`, `identity_`, `writer_`, `summary_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(oastats_core::metrics::PIPELINE_LINES_READ_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 스킵 사유 레이블 키 (`ErrorCategory::as_str()` 값)
pub const LABEL_REASON: &str = "reason";

/// 싱크 레이블 키 (records, requests, csv, search)
pub const LABEL_SINK: &str = "sink";

/// 요약 대상 종류 레이블 키 (author, dlc, handle, overall)
pub const LABEL_KIND: &str = "kind";

// ─── Pipeline 메트릭 ───────────────────────────────────────────────

/// Pipeline: 읽은 전체 라인 수 (counter)
pub const PIPELINE_LINES_READ_TOTAL: &str = "oastats_pipeline_lines_read_total";

/// Pipeline: 방출된 보강 레코드 수 (counter)
pub const PIPELINE_RECORDS_EMITTED_TOTAL: &str = "oastats_pipeline_records_emitted_total";

/// Pipeline: 건너뛴 라인 수 (counter, label: reason)
pub const PIPELINE_RECORDS_SKIPPED_TOTAL: &str = "oastats_pipeline_records_skipped_total";

// ─── Identity 메트릭 ───────────────────────────────────────────────

/// Identity: 메모이제이션 캐시 적중 수 (counter)
pub const IDENTITY_CACHE_HITS_TOTAL: &str = "oastats_identity_cache_hits_total";

/// Identity: 메모이제이션 캐시 미스 수 (counter)
pub const IDENTITY_CACHE_MISSES_TOTAL: &str = "oastats_identity_cache_misses_total";

/// Identity: 식별 서비스 요청 지연 시간 (histogram, 초)
pub const IDENTITY_REQUEST_DURATION_SECONDS: &str = "oastats_identity_request_duration_seconds";

// ─── Writer 메트릭 ─────────────────────────────────────────────────

/// Writer: 플러시된 배치 수 (counter, label: sink)
pub const WRITER_BATCHES_FLUSHED_TOTAL: &str = "oastats_writer_batches_flushed_total";

/// Writer: 싱크로 전달된 항목 수 (counter, label: sink)
pub const WRITER_ITEMS_WRITTEN_TOTAL: &str = "oastats_writer_items_written_total";

// ─── Summary 메트릭 ────────────────────────────────────────────────

/// Summary: 기록된 요약 객체 수 (counter, label: kind)
pub const SUMMARY_OBJECTS_WRITTEN_TOTAL: &str = "oastats_summary_objects_written_total";

/// Summary: 실패한 요약 작업 수 (counter, label: kind)
pub const SUMMARY_TASKS_FAILED_TOTAL: &str = "oastats_summary_tasks_failed_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        PIPELINE_LINES_READ_TOTAL,
        "Total number of raw access-log lines read"
    );
    describe_counter!(
        PIPELINE_RECORDS_EMITTED_TOTAL,
        "Total number of enriched records emitted by the pipeline"
    );
    describe_counter!(
        PIPELINE_RECORDS_SKIPPED_TOTAL,
        "Lines skipped by the pipeline, labelled by reason"
    );

    describe_counter!(
        IDENTITY_CACHE_HITS_TOTAL,
        "Identity lookups answered from the per-run cache"
    );
    describe_counter!(
        IDENTITY_CACHE_MISSES_TOTAL,
        "Identity lookups that reached the identity service"
    );
    describe_histogram!(
        IDENTITY_REQUEST_DURATION_SECONDS,
        "Identity service request latency in seconds"
    );

    describe_counter!(
        WRITER_BATCHES_FLUSHED_TOTAL,
        "Batches handed to a sink by the buffered writer"
    );
    describe_counter!(
        WRITER_ITEMS_WRITTEN_TOTAL,
        "Items handed to a sink by the buffered writer"
    );

    describe_counter!(
        SUMMARY_OBJECTS_WRITTEN_TOTAL,
        "Summary objects written to the summary collection"
    );
    describe_counter!(
        SUMMARY_TASKS_FAILED_TOTAL,
        "Summary computations that failed and were skipped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        PIPELINE_LINES_READ_TOTAL,
        PIPELINE_RECORDS_EMITTED_TOTAL,
        PIPELINE_RECORDS_SKIPPED_TOTAL,
        IDENTITY_CACHE_HITS_TOTAL,
        IDENTITY_CACHE_MISSES_TOTAL,
        IDENTITY_REQUEST_DURATION_SECONDS,
        WRITER_BATCHES_FLUSHED_TOTAL,
        WRITER_ITEMS_WRITTEN_TOTAL,
        SUMMARY_OBJECTS_WRITTEN_TOTAL,
        SUMMARY_TASKS_FAILED_TOTAL,
    ];

    #[test]
    fn all_metrics_start_with_oastats_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("oastats_"),
                "Metric '{}' does not start with 'oastats_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.ends_with("_total") || name.ends_with("_seconds"),
                "Metric '{}' has no unit suffix",
                name
            );
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_REASON, LABEL_SINK, LABEL_KIND] {
            assert_eq!(label.to_lowercase(), label);
        }
    }
}
