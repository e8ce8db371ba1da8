//! Error taxonomy for a pipeline run
//!
//! Only [`EtlError::FatalSetup`] and [`EtlError::Config`] abort a run. Every
//! other variant is raised while processing a single catalog entity and is
//! caught and reported by the orchestrator.

use std::path::PathBuf;

/// Error type for pipeline operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EtlError {
    /// The scratch area could not be prepared
    #[error("Failed to prepare scratch area {path}: {message}")]
    FatalSetup { path: PathBuf, message: String },

    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operational source unreachable (connection, auth, network)
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Query rejected by the source (syntax, type mismatch, missing object)
    #[error("Query failed: {0}")]
    QueryError(String),

    /// Extracted rows could not be transformed into the declared output
    #[error("Transform failed on column '{column}': {message}")]
    Transform { column: String, message: String },

    /// A timestamp had no canonical time key
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Staged file could not be written
    #[error("Staging IO error for {path}: {message}")]
    StagingIo { path: PathBuf, message: String },

    /// Warehouse refused or failed the load job
    #[error("Load rejected for {table}: {message}")]
    LoadRejected { table: String, message: String },
}

impl EtlError {
    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, EtlError::FatalSetup { .. } | EtlError::Config(_))
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::FatalSetup { .. } => "fatal_setup",
            EtlError::Config(_) => "config",
            EtlError::SourceUnavailable(_) => "source_unavailable",
            EtlError::QueryError(_) => "query_error",
            EtlError::Transform { .. } => "transform",
            EtlError::InvalidTimestamp(_) => "invalid_timestamp",
            EtlError::StagingIo { .. } => "staging_io",
            EtlError::LoadRejected { .. } => "load_rejected",
        }
    }

    pub(crate) fn transform(column: impl Into<String>, message: impl Into<String>) -> Self {
        EtlError::Transform {
            column: column.into(),
            message: message.into(),
        }
    }

    pub(crate) fn load_rejected(table: impl Into<String>, message: impl Into<String>) -> Self {
        EtlError::LoadRejected {
            table: table.into(),
            message: message.into(),
        }
    }
}

/// Result type for pipeline operations
pub type EtlResult<T> = Result<T, EtlError>;
