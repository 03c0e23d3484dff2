//! Conflict resolution for the authoritative table: full replace from master

use libsql::Connection;

use crate::db::{LibSqlRecordRepository, RecordRepository};
use crate::error::{Error, Result};
use crate::models::SyncRecord;

use super::TableSpec;

/// Replaces the local copy of the authoritative table with master's copy.
pub struct ConflictResolver<'a> {
    conn: &'a Connection,
    spec: &'a TableSpec,
}

impl<'a> ConflictResolver<'a> {
    /// Fails unless `spec` is the authoritative table.
    pub fn new(conn: &'a Connection, spec: &'a TableSpec) -> Result<Self> {
        if !spec.is_authoritative() {
            return Err(Error::InvalidInput(format!(
                "table {} is not authoritative",
                spec.name()
            )));
        }
        Ok(Self { conn, spec })
    }

    /// Delete every local row and insert master's rows verbatim, all in one
    /// transaction. On failure the table is left exactly as it was.
    ///
    /// Tombstones in master's snapshot are not inserted.
    pub async fn replace_all(&self, records: &[SyncRecord]) -> Result<usize> {
        let repo = LibSqlRecordRepository::new(self.conn, self.spec);
        let table = self.spec.name();

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let mut inserted = 0;
        let result = async {
            let removed = repo.purge_all().await?;
            tracing::debug!(table, removed, "Cleared authoritative table");
            for record in records.iter().filter(|record| !record.is_delete()) {
                repo.insert(record).await?;
                inserted += 1;
            }
            Ok::<(), Error>(())
        }
        .await;

        if let Err(error) = result {
            self.conn.execute("ROLLBACK", ()).await.ok();
            tracing::warn!(table, "Rolled back authoritative replace: {error}");
            return Err(error);
        }

        if let Err(error) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }

        tracing::info!(table, records = inserted, "Replaced authoritative table from master");
        Ok(inserted)
    }
}
