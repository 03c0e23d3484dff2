//! Error types for gaspos-core

use thiserror::Error;

/// Result type alias using gaspos-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gaspos-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Table is not part of the synced table set
    #[error("Unknown sync table: {0}")]
    UnknownTable(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client failure (timeout, connection refused, TLS, body decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote node answered with a non-2xx status
    #[error("Remote returned HTTP {status}: {message}")]
    Transport { status: u16, message: String },

    /// Remote rejected records or local apply failed for a table
    #[error("Sync error: {0}")]
    Sync(String),

    /// Another orchestrator run holds the run lease
    #[error("Sync already in progress (lease held by {0})")]
    SyncInProgress(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether the failure came from talking to the remote node.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Transport { .. })
    }
}
