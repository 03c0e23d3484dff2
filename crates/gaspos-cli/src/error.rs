use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] gaspos_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Sync failed: {0}")]
    SyncFailed(String),
}

impl CliError {
    /// Process exit status; schedulers tell a failed run apart from a usage error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::SyncFailed(_) => 2,
            _ => 1,
        }
    }
}
