//! `oastats init` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use oastats_core::config::StorageSection;
use oastats_storage::{db, migrate};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `init` command.
pub async fn execute(storage: &StorageSection, writer: &OutputWriter) -> Result<(), CliError> {
    let report = initialize(storage).await?;
    writer.render(&report)?;
    Ok(())
}

/// Create both database files and their schemas. Safe to run repeatedly.
async fn initialize(storage: &StorageSection) -> Result<InitReport, CliError> {
    let relational = db::connect(&storage.relational_db).await?;
    migrate::migrate_relational(&relational).await?;
    relational.close().await;

    let records = db::connect(&storage.records_db).await?;
    migrate::migrate_records(&records).await?;
    records.close().await;

    info!(
        relational_db = %storage.relational_db,
        records_db = %storage.records_db,
        "schemas ready"
    );

    Ok(InitReport {
        relational_db: storage.relational_db.clone(),
        records_db: storage.records_db.clone(),
    })
}

/// Schema initialization report.
#[derive(Serialize)]
pub struct InitReport {
    pub relational_db: String,
    pub records_db: String,
}

impl Render for InitReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Schemas: {}", "READY".green().bold())?;
        writeln!(w, "  Relational store: {}", self.relational_db)?;
        writeln!(w, "  Record store:     {}", self.records_db)?;
        Ok(())
    }
}
