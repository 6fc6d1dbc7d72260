//! 요약 집계
//!
//! 저자, 학과, 문서별 요약 객체와 `overall` 요약 객체 하나를 만들어
//! 요약 컬렉션을 통째로 교체합니다. 입력은 둘 중 하나입니다.
//!
//! - [`relational`]: 정규화된 엔티티 테이블과 `requests` 테이블에 대한 집계 질의
//! - [`search`]: 검색 색인에 대한 패싯 질의 (제한된 워커 풀에서 병렬 실행)
//!
//! 두 경로 모두 [`SummaryStore`](crate::records::SummaryStore)의 스테이징을 거쳐
//! 실행 마지막에 한 번에 반영됩니다.

pub mod relational;
pub mod search;

use std::fmt;

pub use relational::summarize_relational;
pub use search::SearchSummarizer;

/// 요약 실행 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryReport {
    /// 스테이징에 기록된 요약 객체 수
    pub written: u64,
    /// 실패한 작업 수 (검색 경로에서만 0이 아닐 수 있음)
    pub failed: u64,
}

impl SummaryReport {
    /// 실패 없이 끝났는지 여부
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} written, {} failed", self.written, self.failed)
    }
}

/// SQLite `COUNT(*)` 값을 다운로드 수로 변환합니다.
pub(crate) fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or_default()
}
