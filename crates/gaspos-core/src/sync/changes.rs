//! Change set reader

use chrono::{DateTime, Utc};
use libsql::Connection;

use crate::db::{LibSqlRecordRepository, RecordRepository};
use crate::error::Result;
use crate::models::SyncRecord;

use super::TableRegistry;

/// Reads the records of a table modified after a watermark.
///
/// The result is a set, not a log: no ordering is promised within a batch or
/// between tables.
pub struct ChangeSetReader<'a> {
    conn: &'a Connection,
    registry: &'a TableRegistry,
}

impl<'a> ChangeSetReader<'a> {
    pub const fn new(conn: &'a Connection, registry: &'a TableRegistry) -> Self {
        Self { conn, registry }
    }

    /// Everything modified strictly after `since`, or the whole table for `None`.
    pub async fn changes_since(
        &self,
        table: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SyncRecord>> {
        let spec = self.registry.require(table)?;
        LibSqlRecordRepository::new(self.conn, spec)
            .changes_since(since)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::util::millis_to_datetime;
    use crate::Error;
    use serde_json::Map;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reader_validates_table_and_filters_by_watermark() {
        let db = Database::open_in_memory().await.unwrap();
        let registry = TableRegistry::standard();
        db.install_tables(&registry).await.unwrap();

        let repo =
            LibSqlRecordRepository::new(db.connection(), registry.require("transactions").unwrap());
        let mut record = SyncRecord::new("t-1".parse().unwrap(), Map::new());
        record.updated_at = millis_to_datetime(10_000);
        repo.upsert(&record).await.unwrap();

        let reader = ChangeSetReader::new(db.connection(), &registry);
        assert_eq!(
            reader.changes_since("transactions", None).await.unwrap().len(),
            1
        );
        assert!(reader
            .changes_since("transactions", Some(millis_to_datetime(10_000)))
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            reader.changes_since("invoices", None).await,
            Err(Error::UnknownTable(_))
        ));
    }
}
