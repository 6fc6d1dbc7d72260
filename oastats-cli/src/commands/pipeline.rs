//! `oastats pipeline` command handler
//!
//! Reads access logs (files in order, or stdin), runs every line through the
//! log pipeline and hands the enriched records to the selected sink through a
//! buffered writer that is always flushed at the end of the run.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{debug, info, warn};

use oastats_core::config::{OastatsConfig, StorageSection, UpstreamPolicy};
use oastats_core::types::EnrichedRecord;
use oastats_log_pipeline::{
    GeoLookup, IdentityService, LogPipeline, PipelineConfig, PipelineStats, continue_after,
};
use oastats_storage::{
    BatchSink, BufferedWriter, CsvSink, DocumentIdentity, EntityResolver, RecordStore,
    RequestFact, RequestTableSink, db, migrate, scoped,
};

use crate::cli::{PipelineArgs, SinkKind};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `pipeline` command.
pub async fn execute(
    args: PipelineArgs,
    config: &OastatsConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let pipeline_config = PipelineConfig::from_core(&config.pipeline).with_months(args.months);
    let policy = pipeline_config.on_upstream_error;
    let mut pipeline = LogPipeline::from_config(&pipeline_config)?;
    let batch_size = config.storage.record_batch_size;

    info!(
        sink = ?args.sink,
        files = args.files.len(),
        months = ?pipeline_config.months,
        on_upstream_error = %policy,
        "starting pipeline run"
    );

    let written = match args.sink {
        SinkKind::Csv => {
            let mut resolver = relational_resolver(&config.storage).await?;
            let sink = CsvSink::new(tokio::io::stdout());
            drive(&mut pipeline, &args.files, policy, sink, batch_size, async |record| {
                request_fact(&mut resolver, record).await
            })
            .await?
        }
        SinkKind::Requests => {
            let mut resolver = relational_resolver(&config.storage).await?;
            let sink = RequestTableSink::new(resolver.pool().clone());
            drive(&mut pipeline, &args.files, policy, sink, batch_size, async |record| {
                request_fact(&mut resolver, record).await
            })
            .await?
        }
        SinkKind::Records => {
            let pool = db::connect(&config.storage.records_db).await?;
            migrate::migrate_records(&pool).await?;
            let sink = RecordStore::new(pool);
            drive(
                &mut pipeline,
                &args.files,
                policy,
                sink,
                batch_size,
                async |record: EnrichedRecord| -> Result<Option<EnrichedRecord>, CliError> {
                    Ok(Some(record))
                },
            )
            .await?
        }
    };

    let stats = pipeline.stats();
    stats.log_summary();

    let report = PipelineReport::new(args.sink, &args.files, stats, written);
    if args.sink == SinkKind::Csv {
        writer.render_stderr(&report)?;
    } else {
        writer.render(&report)?;
    }

    Ok(())
}

async fn relational_resolver(storage: &StorageSection) -> Result<EntityResolver, CliError> {
    let pool = db::connect(&storage.relational_db).await?;
    migrate::migrate_relational(&pool).await?;
    Ok(EntityResolver::new(pool))
}

/// Resolve the record's document and turn it into a request fact.
async fn request_fact(
    resolver: &mut EntityResolver,
    record: EnrichedRecord,
) -> Result<Option<RequestFact>, CliError> {
    let Some(doc) = DocumentIdentity::from_record(&record) else {
        warn!(request = %record.request, "record has no document handle, skipping");
        return Ok(None);
    };
    let document_id = resolver.resolve(&doc).await?;
    Ok(Some(RequestFact::from_record(&record, document_id)))
}

/// Feed every input through the pipeline into `sink`. Returns the number of items written.
///
/// An empty `files` list reads stdin.
async fn drive<G, S, T, K, F>(
    pipeline: &mut LogPipeline<G, S>,
    files: &[PathBuf],
    policy: UpstreamPolicy,
    sink: K,
    batch_size: usize,
    mut convert: F,
) -> Result<u64, CliError>
where
    G: GeoLookup,
    S: IdentityService,
    K: BatchSink<T>,
    F: AsyncFnMut(EnrichedRecord) -> Result<Option<T>, CliError>,
{
    scoped::<T, K, _, _, _>(sink, batch_size, async |writer| {
        let mut written = 0;
        if files.is_empty() {
            debug!("reading access log from stdin");
            let stdin = BufReader::new(tokio::io::stdin());
            written += feed(pipeline, stdin, policy, writer, &mut convert).await?;
        }
        for path in files {
            info!(path = %path.display(), "reading access log");
            let file = tokio::fs::File::open(path).await?;
            written += feed(pipeline, BufReader::new(file), policy, writer, &mut convert).await?;
        }
        Ok::<_, CliError>(written)
    })
    .await
}

async fn feed<R, G, S, T, K, F>(
    pipeline: &mut LogPipeline<G, S>,
    reader: R,
    policy: UpstreamPolicy,
    writer: &mut BufferedWriter<T, K>,
    convert: &mut F,
) -> Result<u64, CliError>
where
    R: AsyncBufRead + Unpin,
    G: GeoLookup,
    S: IdentityService,
    K: BatchSink<T>,
    F: AsyncFnMut(EnrichedRecord) -> Result<Option<T>, CliError>,
{
    let mut written = 0;
    let mut stream = pipeline.process(reader);

    while let Some(item) = stream.next().await {
        match item {
            Ok(record) => {
                if let Some(out) = convert(record).await? {
                    writer.write(out).await?;
                    written += 1;
                }
            }
            Err(e) if continue_after(&e, policy) => {
                debug!(error = %e, category = %e.category(), "skipping line");
            }
            Err(e) => {
                warn!(error = %e, "pipeline run aborted");
                return Err(e.into());
            }
        }
    }

    Ok(written)
}

/// Pipeline run report.
#[derive(Serialize)]
pub struct PipelineReport {
    pub sink: String,
    pub inputs: Vec<String>,
    pub lines_read: u64,
    pub emitted: u64,
    pub written: u64,
    pub skipped: u64,
}

impl PipelineReport {
    fn new(sink: SinkKind, files: &[PathBuf], stats: &PipelineStats, written: u64) -> Self {
        let inputs = if files.is_empty() {
            vec!["<stdin>".to_owned()]
        } else {
            files.iter().map(|p| p.display().to_string()).collect()
        };
        Self {
            sink: format!("{:?}", sink).to_lowercase(),
            inputs,
            lines_read: stats.lines_read,
            emitted: stats.emitted,
            written,
            skipped: stats.total_skipped(),
        }
    }
}

impl Render for PipelineReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Pipeline Run: {}", self.sink.bold())?;
        writeln!(w, "  Inputs:     {}", self.inputs.join(", "))?;
        writeln!(w, "  Lines read: {}", self.lines_read)?;
        writeln!(w, "  Emitted:    {}", self.emitted)?;
        writeln!(w, "  Written:    {}", self.written.to_string().green())?;
        writeln!(w, "  Skipped:    {}", self.skipped)?;
        Ok(())
    }
}
