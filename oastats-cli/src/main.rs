//! OA Stats CLI -- access-log pipeline, search indexing and summary rebuilds.
//!
//! # Exit codes
//!
//! See [`error::CliError::exit_code`].

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;

use oastats_core::config::GeneralConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let writer = OutputWriter::new(cli.output);

    if let Err(e) = run(cli, &writer).await {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, writer: &OutputWriter) -> Result<(), CliError> {
    let command = match cli.command {
        Commands::Config(args) => {
            // Config commands report load errors themselves, so logging starts from defaults.
            let mut general = GeneralConfig::default();
            if let Some(level) = cli.log_level {
                general.log_level = level;
            }
            init_logging(&general)?;
            return commands::config::execute(args, &cli.config, writer).await;
        }
        other => other,
    };

    let mut config = commands::load_config(&cli.config).await?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    init_logging(&config.general)?;

    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    match command {
        Commands::Init => commands::init::execute(&config.storage, writer).await,
        Commands::Pipeline(args) => commands::pipeline::execute(args, &config, writer).await,
        Commands::Index => commands::index::execute(&config, writer).await,
        Commands::Summary(args) => commands::summary::execute(args, &config, writer).await,
        Commands::Config(_) => Ok(()),
    }
}

fn init_logging(general: &GeneralConfig) -> Result<(), CliError> {
    logging::init_tracing(general).map_err(|e| CliError::Config(e.to_string()))
}
