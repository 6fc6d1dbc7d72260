//! `oastats summary` command handler

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use oastats_core::config::OastatsConfig;
use oastats_storage::{
    RecordStore, SearchSummarizer, SolrIndex, SummaryReport, SummaryStore, db, migrate,
    summarize_relational,
};

use crate::cli::{SummaryArgs, SummarySource};
use crate::commands::index::SEARCH_TIMEOUT;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `summary` command.
///
/// Failed search tasks are reported but do not fail the command; the summary
/// collection is replaced with whatever was computed.
pub async fn execute(
    args: SummaryArgs,
    config: &OastatsConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let records_pool = db::connect(&config.storage.records_db).await?;
    migrate::migrate_records(&records_pool).await?;
    let store = SummaryStore::new(records_pool.clone());

    let report = match args.source {
        SummarySource::Relational => {
            let relational = db::connect(&config.storage.relational_db).await?;
            migrate::migrate_relational(&relational).await?;
            info!(relational_db = %config.storage.relational_db, "summarizing relational store");
            summarize_relational(&relational, &store).await?
        }
        SummarySource::Search => {
            let solr = Arc::new(SolrIndex::new(&config.search.solr_url, SEARCH_TIMEOUT)?);
            let targets = SearchSummarizer::<SolrIndex>::targets(&RecordStore::new(records_pool))
                .await?;
            let workers = args.workers.unwrap_or(config.search.workers);
            info!(
                solr_url = %solr.base_url(),
                targets = targets.len(),
                workers,
                "summarizing search index"
            );
            SearchSummarizer::new(solr, store)
                .with_section(&config.search)
                .workers(workers)
                .run(targets)
                .await?
        }
    };

    if !report.is_clean() {
        warn!(failed = report.failed, "some summaries could not be computed");
    }
    info!(%report, "summary collection replaced");

    writer.render(&SummaryRunReport::new(args.source, report))?;
    Ok(())
}

/// Summary run report.
#[derive(Serialize)]
pub struct SummaryRunReport {
    pub source: String,
    pub written: u64,
    pub failed: u64,
}

impl SummaryRunReport {
    fn new(source: SummarySource, report: SummaryReport) -> Self {
        Self {
            source: format!("{:?}", source).to_lowercase(),
            written: report.written,
            failed: report.failed,
        }
    }
}

impl Render for SummaryRunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Summary Rebuild: {}", self.source.bold())?;
        writeln!(w, "  Written: {}", self.written.to_string().green())?;
        if self.failed > 0 {
            writeln!(w, "  Failed:  {}", self.failed.to_string().red().bold())?;
        } else {
            writeln!(w, "  Failed:  0")?;
        }
        Ok(())
    }
}
