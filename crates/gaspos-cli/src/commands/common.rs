use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gaspos_core::sync::{ExchangeService, NodeStatusStore, TableRegistry};
use gaspos_core::{DatabaseService, SyncSettings};

use crate::error::CliError;

/// Local files of this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePaths {
    pub db: PathBuf,
    pub status: PathBuf,
}

impl NodePaths {
    /// Flag, then environment variable, then the platform data directory.
    pub fn resolve(db_path: Option<PathBuf>, status_path: Option<PathBuf>) -> Self {
        Self {
            db: db_path
                .or_else(|| env::var_os("GASPOS_DB_PATH").map(PathBuf::from))
                .unwrap_or_else(|| data_dir().join("gaspos.db")),
            status: status_path
                .or_else(|| env::var_os("GASPOS_STATUS_PATH").map(PathBuf::from))
                .unwrap_or_else(|| data_dir().join("sync_status.json")),
        }
    }

    #[cfg(test)]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            db: dir.join("gaspos.db"),
            status: dir.join("sync_status.json"),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gaspos")
}

pub async fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path.to_path_buf(), TableRegistry::standard()).await?)
}

pub fn open_status_store(path: &Path) -> NodeStatusStore {
    NodeStatusStore::new(path.to_path_buf())
}

pub fn load_settings() -> Result<SyncSettings, CliError> {
    Ok(SyncSettings::from_env()?)
}

/// Exchange service over the local replica, used for read-only reports.
pub async fn open_exchange(
    paths: &NodePaths,
    settings: SyncSettings,
) -> Result<ExchangeService, CliError> {
    let db = open_database(&paths.db).await?;
    Ok(ExchangeService::new(
        db,
        Arc::new(open_status_store(&paths.status)),
        Arc::new(settings),
    ))
}

pub fn format_datetime(value: Option<&DateTime<Utc>>) -> String {
    value.map_or_else(
        || "never".to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
