//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default configuration file, optional when absent.
pub const DEFAULT_CONFIG: &str = "oastats.toml";

/// OA Stats -- open access download statistics.
///
/// Use `oastats <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "oastats", version, about, long_about = None)]
pub struct Cli {
    /// Path to the oastats.toml configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format for command reports.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the relational and record database schemas.
    Init,

    /// Run access logs through the pipeline into a sink.
    Pipeline(PipelineArgs),

    /// Index the record collection into the search index.
    Index,

    /// Rebuild the summary collection.
    Summary(SummaryArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- pipeline ----

/// Where enriched records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Resolve entities, print request facts as CSV on stdout.
    Csv,
    /// Resolve entities, insert request facts into the relational store.
    Requests,
    /// Store enriched records in the record collection.
    Records,
}

/// Process access logs.
#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Log files to read (default: stdin).
    pub files: Vec<PathBuf>,

    /// Only keep requests from this month (Mon/YYYY or Mon-YYYY). Repeatable.
    #[arg(short, long = "month")]
    pub months: Vec<String>,

    /// Output sink.
    #[arg(long, default_value = "records")]
    pub sink: SinkKind,
}

// ---- summary ----

/// Where summary numbers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummarySource {
    /// Aggregate queries over the relational store.
    Relational,
    /// Faceted queries against the search index.
    Search,
}

/// Rebuild the summary collection.
#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Summary source.
    #[arg(long, default_value = "search")]
    pub source: SummarySource,

    /// Override the number of concurrent search queries.
    #[arg(long)]
    pub workers: Option<usize>,
}

// ---- config ----

/// Manage oastats configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, pipeline, storage, search).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::try_parse_from(["oastats", "init"]).expect("parse succeeded");
        assert!(matches!(cli.command, Commands::Init));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG));
    }

    #[test]
    fn test_cli_parse_pipeline_defaults() {
        let cli = Cli::try_parse_from(["oastats", "pipeline"]).expect("parse succeeded");
        match cli.command {
            Commands::Pipeline(args) => {
                assert!(args.files.is_empty(), "no files means stdin");
                assert!(args.months.is_empty());
                assert_eq!(args.sink, SinkKind::Records);
            }
            _ => panic!("expected Pipeline command"),
        }
    }

    #[test]
    fn test_cli_parse_pipeline_files_months_sink() {
        let cli = Cli::try_parse_from([
            "oastats",
            "pipeline",
            "access.log",
            "access.log.1",
            "--month",
            "Jan/2013",
            "-m",
            "Feb-2013",
            "--sink",
            "csv",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Pipeline(args) => {
                assert_eq!(args.files.len(), 2);
                assert_eq!(args.months, vec!["Jan/2013", "Feb-2013"]);
                assert_eq!(args.sink, SinkKind::Csv);
            }
            _ => panic!("expected Pipeline command"),
        }
    }

    #[test]
    fn test_cli_parse_pipeline_rejects_unknown_sink() {
        let result = Cli::try_parse_from(["oastats", "pipeline", "--sink", "mongo"]);
        assert!(result.is_err(), "unknown sink should be rejected");
    }

    #[test]
    fn test_cli_parse_summary_source() {
        let cli = Cli::try_parse_from(["oastats", "summary", "--source", "relational"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Summary(args) => {
                assert_eq!(args.source, SummarySource::Relational);
                assert!(args.workers.is_none());
            }
            _ => panic!("expected Summary command"),
        }
    }

    #[test]
    fn test_cli_parse_summary_defaults_to_search() {
        let cli = Cli::try_parse_from(["oastats", "summary", "--workers", "8"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Summary(args) => {
                assert_eq!(args.source, SummarySource::Search);
                assert_eq!(args.workers, Some(8));
            }
            _ => panic!("expected Summary command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["oastats", "config", "show", "--section", "storage"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Config(ConfigArgs {
                action: ConfigAction::Show { section },
            }) => assert_eq!(section.as_deref(), Some("storage")),
            _ => panic!("expected Config Show command"),
        }
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["oastats", "index", "--log-level", "debug", "--output", "json"])
            .expect("parse succeeded");
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.output, OutputFormat::Json));
    }

    #[test]
    fn test_cli_command_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
