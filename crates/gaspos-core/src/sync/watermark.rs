//! Per-table "last successfully synced at" timestamps

use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::util::{millis_to_datetime, now_millis};

/// Watermark of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub table: String,
    pub last_synced_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable watermark storage.
///
/// `set` never moves a watermark backwards; only [`Self::clear`] and
/// [`Self::clear_all`] can.
pub struct WatermarkStore<'a> {
    conn: &'a Connection,
}

impl<'a> WatermarkStore<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// `None` means the table was never synced.
    pub async fn get(&self, table: &str) -> Result<Option<DateTime<Utc>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_synced_at FROM sync_watermarks WHERE table_name = ?",
                [table],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(millis_to_datetime(row.get::<i64>(0)?))),
            None => Ok(None),
        }
    }

    /// Advance the table's watermark to `at` unless it is already later.
    pub async fn set(&self, table: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_watermarks (table_name, last_synced_at, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(table_name) DO UPDATE SET
                    last_synced_at = MAX(sync_watermarks.last_synced_at, excluded.last_synced_at),
                    updated_at = excluded.updated_at",
                params![table, at.timestamp_millis(), now_millis()],
            )
            .await?;
        tracing::debug!(table, watermark = %at, "Advanced watermark");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Watermark>> {
        let mut rows = self
            .conn
            .query(
                "SELECT table_name, last_synced_at, updated_at
                 FROM sync_watermarks ORDER BY table_name",
                (),
            )
            .await?;
        let mut watermarks = Vec::new();
        while let Some(row) = rows.next().await? {
            watermarks.push(Watermark {
                table: row.get(0)?,
                last_synced_at: millis_to_datetime(row.get(1)?),
                updated_at: millis_to_datetime(row.get(2)?),
            });
        }
        Ok(watermarks)
    }

    /// Forget one table's watermark so the next run exchanges everything.
    pub async fn clear(&self, table: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM sync_watermarks WHERE table_name = ?", [table])
            .await?;
        Ok(affected > 0)
    }

    pub async fn clear_all(&self) -> Result<u64> {
        let affected = self
            .conn
            .execute("DELETE FROM sync_watermarks", ())
            .await?;
        Ok(affected)
    }

    /// Number of stored watermarks.
    pub async fn count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_watermarks", ())
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unsynced_table_has_no_watermark() {
        let db = Database::open_in_memory().await.unwrap();
        let store = WatermarkStore::new(db.connection());
        assert_eq!(store.get("stock").await.unwrap(), None);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_is_monotonic() {
        let db = Database::open_in_memory().await.unwrap();
        let store = WatermarkStore::new(db.connection());

        store.set("stock", millis_to_datetime(5_000)).await.unwrap();
        store.set("stock", millis_to_datetime(3_000)).await.unwrap();
        assert_eq!(
            store.get("stock").await.unwrap(),
            Some(millis_to_datetime(5_000))
        );

        store.set("stock", millis_to_datetime(9_000)).await.unwrap();
        assert_eq!(
            store.get("stock").await.unwrap(),
            Some(millis_to_datetime(9_000))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clear_moves_watermark_back_to_unsynced() {
        let db = Database::open_in_memory().await.unwrap();
        let store = WatermarkStore::new(db.connection());

        store.set("stock", millis_to_datetime(5_000)).await.unwrap();
        store.set("users", millis_to_datetime(6_000)).await.unwrap();

        assert!(store.clear("stock").await.unwrap());
        assert!(!store.clear("stock").await.unwrap());
        assert_eq!(store.get("stock").await.unwrap(), None);

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].table, "users");

        assert_eq!(store.clear_all().await.unwrap(), 1);
        assert!(store.list().await.unwrap().is_empty());
    }
}
