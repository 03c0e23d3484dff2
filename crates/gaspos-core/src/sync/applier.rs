//! Record applier: idempotent create-or-update and delete keyed by record ID

use libsql::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{LibSqlRecordRepository, RecordRepository};
use crate::error::Result;
use crate::models::SyncRecord;

use super::TableRegistry;

/// One record that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub error: String,
}

impl RecordError {
    pub fn new(id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            id,
            error: error.into(),
        }
    }
}

/// Outcome of applying a batch; errors are gathered, never short-circuited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub errors: Vec<RecordError>,
}

impl ApplyReport {
    pub fn first_error(&self) -> Option<&RecordError> {
        self.errors.first()
    }
}

/// Applies incoming records to local tables.
///
/// Incoming records win over local ones (last writer wins, no vector clock)
/// and keep their remote identifiers and timestamps.
pub struct RecordApplier<'a> {
    conn: &'a Connection,
    registry: &'a TableRegistry,
}

impl<'a> RecordApplier<'a> {
    pub const fn new(conn: &'a Connection, registry: &'a TableRegistry) -> Self {
        Self { conn, registry }
    }

    /// Apply one record. Deleting an absent record is not an error.
    pub async fn apply(&self, table: &str, record: &SyncRecord) -> Result<()> {
        let spec = self.registry.require(table)?;
        let repo = LibSqlRecordRepository::new(self.conn, spec);
        if record.is_delete() {
            let removed = repo.purge(&record.id).await?;
            tracing::debug!(table, id = %record.id, removed, "Applied delete");
        } else {
            repo.upsert(record).await?;
        }
        Ok(())
    }

    /// Apply every record independently and collect the failures.
    ///
    /// An unknown table fails the whole call; nothing can be applied to it.
    pub async fn apply_batch(&self, table: &str, records: &[SyncRecord]) -> Result<ApplyReport> {
        self.registry.require(table)?;

        let mut report = ApplyReport::default();
        for record in records {
            match self.apply(table, record).await {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    tracing::warn!(table, id = %record.id, "Failed to apply record: {error}");
                    report
                        .errors
                        .push(RecordError::new(Some(record.id.to_string()), error.to_string()));
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::SyncAction;
    use crate::Error;
    use serde_json::{json, Value};

    async fn setup() -> (Database, TableRegistry) {
        let db = Database::open_in_memory().await.unwrap();
        let registry = TableRegistry::standard();
        db.install_tables(&registry).await.unwrap();
        (db, registry)
    }

    fn record(id: &str, payload: Value) -> SyncRecord {
        let Value::Object(map) = payload else {
            panic!("expected object")
        };
        SyncRecord::new(id.parse().unwrap(), map)
    }

    async fn snapshot(db: &Database, registry: &TableRegistry, table: &str) -> Vec<SyncRecord> {
        let repo = LibSqlRecordRepository::new(db.connection(), registry.require(table).unwrap());
        let mut rows = repo.changes_since(None).await.unwrap();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_is_idempotent() {
        let (db, registry) = setup().await;
        let applier = RecordApplier::new(db.connection(), &registry);
        let incoming = record("branch-2-abc", json!({"total": 99}));

        applier.apply("transactions", &incoming).await.unwrap();
        let once = snapshot(&db, &registry, "transactions").await;
        applier.apply("transactions", &incoming).await.unwrap();
        let twice = snapshot(&db, &registry, "transactions").await;

        assert_eq!(once, twice);
        assert_eq!(once.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_incoming_record_overwrites_local_and_keeps_remote_id() {
        let (db, registry) = setup().await;
        let applier = RecordApplier::new(db.connection(), &registry);

        applier
            .apply("users", &record("7", json!({"name": "local"})))
            .await
            .unwrap();
        let mut remote = record("7", json!({"name": "remote", "role": "cashier"}));
        remote.action = SyncAction::Update;
        applier.apply("users", &remote).await.unwrap();

        let rows = snapshot(&db, &registry, "users").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.as_str(), "7");
        assert_eq!(rows[0].payload, remote.payload);
        assert_eq!(rows[0].created_at.timestamp_millis(), remote.created_at.timestamp_millis());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_of_absent_record_succeeds() {
        let (db, registry) = setup().await;
        let applier = RecordApplier::new(db.connection(), &registry);

        let mut tombstone = record("ghost", json!({}));
        tombstone.action = SyncAction::Delete;
        applier.apply("discount_types", &tombstone).await.unwrap();

        applier
            .apply("discount_types", &record("ghost", json!({"pct": 5})))
            .await
            .unwrap();
        applier.apply("discount_types", &tombstone).await.unwrap();
        assert!(snapshot(&db, &registry, "discount_types").await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_gathers_errors_without_aborting() {
        let (db, registry) = setup().await;
        let applier = RecordApplier::new(db.connection(), &registry);

        // Make the second record fail at the store level.
        db.connection()
            .execute(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON transactions
                 WHEN NEW.id = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
                (),
            )
            .await
            .unwrap();

        let batch = vec![
            record("a", json!({})),
            record("bad", json!({})),
            record("c", json!({})),
        ];
        let report = applier.apply_batch("transactions", &batch).await.unwrap();

        assert_eq!(report.applied, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.first_error().and_then(|e| e.id.as_deref()), Some("bad"));
        assert_eq!(snapshot(&db, &registry, "transactions").await.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_for_unknown_table_fails() {
        let (db, registry) = setup().await;
        let applier = RecordApplier::new(db.connection(), &registry);
        let result = applier.apply_batch("invoices", &[record("a", json!({}))]).await;
        assert!(matches!(result, Err(Error::UnknownTable(_))));
    }
}
