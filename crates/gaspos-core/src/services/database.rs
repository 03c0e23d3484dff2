//! Shared database service wrapper used by the server and the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, MutexGuard};

use crate::db::{Database, LibSqlRecordRepository, RecordRepository};
use crate::models::{RecordId, SyncRecord};
use crate::sync::{TableRegistry, Watermark, WatermarkStore};
use crate::Result;

/// Thread-safe service for DB and repository operations.
///
/// Each method holds the connection lock for its own duration only; callers
/// needing several statements under one lock use [`Self::lock`].
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    registry: Arc<TableRegistry>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>, registry: TableRegistry) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::open(&db_path).await?;
        db.install_tables(&registry).await?;
        tracing::info!(
            "Opened database at {} with {} synced tables",
            db_path.display(),
            registry.len()
        );

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            registry: Arc::new(registry),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory(registry: TableRegistry) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        db.install_tables(&registry).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            registry: Arc::new(registry),
            db_path: None,
        })
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Hold the connection for a multi-statement operation.
    pub async fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().await
    }

    /// Create a record owned by `node_id`.
    pub async fn create_record(
        &self,
        table: &str,
        node_id: &str,
        payload: Map<String, Value>,
    ) -> Result<SyncRecord> {
        let spec = self.registry.require(table)?;
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection(), spec)
            .create(node_id, payload)
            .await
    }

    /// Fetch a live record by id.
    pub async fn get_record(&self, table: &str, id: &RecordId) -> Result<Option<SyncRecord>> {
        let spec = self.registry.require(table)?;
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection(), spec)
            .get(id)
            .await
    }

    /// List live records, most recently updated first.
    pub async fn list_records(&self, table: &str, limit: usize) -> Result<Vec<SyncRecord>> {
        let spec = self.registry.require(table)?;
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection(), spec)
            .list(limit)
            .await
    }

    /// Replace a record's payload.
    pub async fn update_record(
        &self,
        table: &str,
        id: &RecordId,
        payload: Map<String, Value>,
    ) -> Result<SyncRecord> {
        let spec = self.registry.require(table)?;
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection(), spec)
            .update(id, payload)
            .await
    }

    /// Soft-delete a record.
    pub async fn delete_record(&self, table: &str, id: &RecordId) -> Result<()> {
        let spec = self.registry.require(table)?;
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection(), spec)
            .delete(id)
            .await
    }

    pub async fn count_records(&self, table: &str) -> Result<u64> {
        let spec = self.registry.require(table)?;
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection(), spec)
            .count()
            .await
    }

    pub async fn watermark(&self, table: &str) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().await;
        WatermarkStore::new(db.connection()).get(table).await
    }

    pub async fn set_watermark(&self, table: &str, at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        WatermarkStore::new(db.connection()).set(table, at).await
    }

    pub async fn list_watermarks(&self) -> Result<Vec<Watermark>> {
        let db = self.db.lock().await;
        WatermarkStore::new(db.connection()).list().await
    }

    /// Clear one table's watermark. The table must be registered.
    pub async fn clear_watermark(&self, table: &str) -> Result<bool> {
        self.registry.require(table)?;
        let db = self.db.lock().await;
        WatermarkStore::new(db.connection()).clear(table).await
    }

    pub async fn clear_all_watermarks(&self) -> Result<u64> {
        let db = self.db.lock().await;
        WatermarkStore::new(db.connection()).clear_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;
    use tempfile::tempdir;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_lifecycle_through_service() {
        let service = DatabaseService::open_in_memory(TableRegistry::standard())
            .await
            .unwrap();

        let record = service
            .create_record("stock", "hq", payload(json!({"stock": 10})))
            .await
            .unwrap();
        service
            .update_record("stock", &record.id, payload(json!({"stock": 8})))
            .await
            .unwrap();
        assert_eq!(service.count_records("stock").await.unwrap(), 1);

        let fetched = service.get_record("stock", &record.id).await.unwrap().unwrap();
        assert_eq!(fetched.payload.get("stock"), Some(&json!(8)));

        service.delete_record("stock", &record.id).await.unwrap();
        assert!(service.list_records("stock", 10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_table_is_rejected() {
        let service = DatabaseService::open_in_memory(TableRegistry::standard())
            .await
            .unwrap();
        assert!(matches!(
            service.count_records("invoices").await,
            Err(Error::UnknownTable(_))
        ));
        assert!(matches!(
            service.clear_watermark("invoices").await,
            Err(Error::UnknownTable(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_path_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("gaspos.db");
        let service = DatabaseService::open_path(&path, TableRegistry::standard())
            .await
            .unwrap();
        assert!(path.exists());
        assert_eq!(service.db_path(), Some(path.as_path()));
    }
}
