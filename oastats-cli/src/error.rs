//! CLI-specific error types and exit code mapping

use oastats_core::error::OastatsError;
use oastats_log_pipeline::LogPipelineError;
use oastats_storage::StorageError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The identity service failed and the run was aborted.
    #[error("identity service failure, run aborted: {0}")]
    Upstream(String),

    /// Relational store, record collection or search index failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (log file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from oastats-core.
    #[error("{0}")]
    Core(#[from] OastatsError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                               |
    /// |------|---------------------------------------|
    /// | 0    | Success                               |
    /// | 1    | General / command error               |
    /// | 2    | Configuration error                   |
    /// | 3    | Identity service failure under abort  |
    /// | 4    | Storage or search index failure       |
    /// | 10   | IO error                              |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Upstream(_) => 3,
            Self::Storage(_) => 4,
            Self::Io(_) => 10,
            Self::Core(OastatsError::Config(_)) => 2,
            Self::Core(OastatsError::Storage(_)) => 4,
            Self::Core(OastatsError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(OastatsError::Pipeline(_)) => 1,
        }
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Io(io) => Self::Io(io),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<LogPipelineError> for CliError {
    fn from(e: LogPipelineError) -> Self {
        match e {
            LogPipelineError::Upstream { .. } => Self::Upstream(e.to_string()),
            LogPipelineError::Config { .. } | LogPipelineError::GeoIp(_) => {
                Self::Config(e.to_string())
            }
            LogPipelineError::Io(io) => Self::Io(io),
            other => Self::Command(other.to_string()),
        }
    }
}
