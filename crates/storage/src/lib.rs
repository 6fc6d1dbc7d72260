#![doc = include_str!("../README.md")]

pub mod db;
pub mod error;
pub mod migrate;
pub mod records;
pub mod request;
pub mod resolver;
pub mod search;
pub mod summary;
pub mod writer;

// --- 주요 타입 re-export ---

pub use error::StorageError;
pub use records::{RecordStore, SummaryStore};
pub use request::{CsvSink, RequestFact, RequestTableSink, to_csv};
pub use resolver::{DocumentIdentity, EntityResolver, resolve_document};
pub use search::{FacetQuery, FacetResult, IndexDocument, IndexSink, QueryTarget, SearchIndex, SolrIndex};
pub use summary::{SearchSummarizer, SummaryReport, summarize_relational};
pub use writer::{BatchSink, BufferedWriter, scoped};
