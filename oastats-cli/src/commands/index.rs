//! `oastats index` command handler

use std::io::Write;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use oastats_core::config::OastatsConfig;
use oastats_storage::{IndexDocument, IndexSink, RecordStore, SearchIndex, SolrIndex, db, scoped};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Timeout for a single search index request.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Execute the `index` command.
pub async fn execute(config: &OastatsConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let records = RecordStore::new(db::connect(&config.storage.records_db).await?);
    let solr = SolrIndex::new(&config.search.solr_url, SEARCH_TIMEOUT)?;

    info!(solr_url = %solr.base_url(), "indexing record collection");
    let report = index_records(&records, &solr, config.search.index_batch_size).await?;
    info!(indexed = report.indexed, skipped = report.skipped, "indexing finished");

    writer.render(&report)?;
    Ok(())
}

/// Page through the record collection and add every convertible record to `index`.
async fn index_records<I: SearchIndex>(
    records: &RecordStore,
    index: &I,
    batch_size: usize,
) -> Result<IndexReport, CliError> {
    let page_size = u32::try_from(batch_size).unwrap_or(u32::MAX).max(1);

    scoped::<IndexDocument, _, _, _, _>(IndexSink::new(index), batch_size, async |writer| {
        let mut report = IndexReport::default();
        let mut after_id = 0;

        loop {
            let page = records.page(after_id, page_size).await?;
            let Some(&(last_id, _)) = page.last() else {
                break;
            };
            after_id = last_id;

            for (id, record) in page {
                match IndexDocument::from_record(&record) {
                    Ok(doc) => {
                        writer.write(doc).await?;
                        report.indexed += 1;
                    }
                    Err(e) => {
                        warn!(record_id = id, error = %e, "record not indexable, skipping");
                        report.skipped += 1;
                    }
                }
            }
        }

        Ok::<_, CliError>(report)
    })
    .await
}

/// Indexing run report.
#[derive(Debug, Default, Serialize)]
pub struct IndexReport {
    pub indexed: u64,
    pub skipped: u64,
}

impl Render for IndexReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Search Index")?;
        writeln!(w, "  Indexed: {}", self.indexed.to_string().green())?;
        if self.skipped > 0 {
            writeln!(w, "  Skipped: {}", self.skipped.to_string().yellow())?;
        } else {
            writeln!(w, "  Skipped: 0")?;
        }
        Ok(())
    }
}
