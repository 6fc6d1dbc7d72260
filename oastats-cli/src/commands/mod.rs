//! Command handlers -- one module per subcommand

pub mod config;
pub mod index;
pub mod init;
pub mod pipeline;
pub mod summary;

use std::path::Path;

use oastats_core::config::OastatsConfig;

use crate::cli::DEFAULT_CONFIG;
use crate::error::CliError;

/// Load the effective configuration for a data command.
///
/// An explicitly named file must exist. When the default `oastats.toml`
/// is absent, built-in defaults plus `OASTATS_*` env overrides are used.
pub async fn load_config(path: &Path) -> Result<OastatsConfig, CliError> {
    let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
    if exists || path != Path::new(DEFAULT_CONFIG) {
        return Ok(OastatsConfig::load(path).await?);
    }

    let mut config = OastatsConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config(&dir.path().join("missing.toml"))
            .await
            .expect_err("named file must exist");
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("oastats.toml");
        std::fs::write(&path, "[search]\nworkers = 9\n").expect("write config");

        let config = load_config(&path).await.expect("config should load");
        assert_eq!(config.search.workers, 9);
    }
}
