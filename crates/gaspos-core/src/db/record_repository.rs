//! Storage of synced records, one SQL table per registered sync table

use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{RecordId, SyncAction, SyncRecord};
use crate::sync::TableSpec;
use crate::util::millis_to_datetime;

/// Trait for synced record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Create a record owned by this node
    async fn create(&self, node_id: &str, payload: Map<String, Value>) -> Result<SyncRecord>;

    /// Get a live record by ID
    async fn get(&self, id: &RecordId) -> Result<Option<SyncRecord>>;

    /// List live records, most recently updated first
    async fn list(&self, limit: usize) -> Result<Vec<SyncRecord>>;

    /// Replace a record's payload and bump its modification time
    async fn update(&self, id: &RecordId, payload: Map<String, Value>) -> Result<SyncRecord>;

    /// Soft delete a record so the deletion is replicated
    async fn delete(&self, id: &RecordId) -> Result<()>;

    /// Count live records
    async fn count(&self) -> Result<u64>;

    /// Records (tombstones included) modified strictly after `since`
    async fn changes_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SyncRecord>>;

    /// Insert or overwrite a record with the incoming fields verbatim
    async fn upsert(&self, record: &SyncRecord) -> Result<()>;

    /// Insert a record verbatim, failing if the ID already exists
    async fn insert(&self, record: &SyncRecord) -> Result<()>;

    /// Physically remove a record; returns whether a row was removed
    async fn purge(&self, id: &RecordId) -> Result<bool>;

    /// Physically remove every row
    async fn purge_all(&self) -> Result<u64>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
    spec: &'a TableSpec,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository for `spec` on the given connection
    pub const fn new(conn: &'a Connection, spec: &'a TableSpec) -> Self {
        Self { conn, spec }
    }

    /// Create the backing table and its index if missing
    pub async fn ensure_table(&self) -> Result<()> {
        let table = self.spec.name();
        self.conn
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS \"{table}\" (
                        id TEXT PRIMARY KEY,
                        payload TEXT NOT NULL DEFAULT '{{}}',
                        created_at INTEGER NOT NULL,
                        updated_at INTEGER NOT NULL,
                        is_deleted INTEGER NOT NULL DEFAULT 0
                    )"
                ),
                (),
            )
            .await?;
        self.conn
            .execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS \"idx_{table}_updated\" ON \"{table}\"(updated_at)"
                ),
                (),
            )
            .await?;
        Ok(())
    }

    fn table(&self) -> &str {
        self.spec.name()
    }

    async fn query_records(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SyncRecord>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::row_to_record(&row)?);
        }
        Ok(records)
    }

    fn row_to_record(row: &Row) -> Result<SyncRecord> {
        let id: String = row.get(0)?;
        let payload: String = row.get(1)?;
        let created_at: i64 = row.get(2)?;
        let updated_at: i64 = row.get(3)?;
        let is_deleted: i64 = row.get(4)?;

        let action = if is_deleted != 0 {
            SyncAction::Delete
        } else if created_at == updated_at {
            SyncAction::Create
        } else {
            SyncAction::Update
        };

        let payload = match serde_json::from_str::<Value>(&payload)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::Database(format!(
                    "record {id} has a non-object payload: {other}"
                )))
            }
        };

        Ok(SyncRecord {
            id: id.parse()?,
            action,
            created_at: millis_to_datetime(created_at),
            updated_at: millis_to_datetime(updated_at),
            payload,
        })
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn create(&self, node_id: &str, payload: Map<String, Value>) -> Result<SyncRecord> {
        let record = SyncRecord::new(RecordId::generate(node_id), payload);
        self.insert(&record).await?;
        tracing::debug!(table = self.table(), id = %record.id, "Created local record");
        Ok(record)
    }

    async fn get(&self, id: &RecordId) -> Result<Option<SyncRecord>> {
        let records = self
            .query_records(
                &format!(
                    "SELECT id, payload, created_at, updated_at, is_deleted
                     FROM \"{}\" WHERE id = ? AND is_deleted = 0",
                    self.table()
                ),
                [id.as_str()],
            )
            .await?;
        Ok(records.into_iter().next())
    }

    async fn list(&self, limit: usize) -> Result<Vec<SyncRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_records(
            &format!(
                "SELECT id, payload, created_at, updated_at, is_deleted
                 FROM \"{}\" WHERE is_deleted = 0
                 ORDER BY updated_at DESC LIMIT ?",
                self.table()
            ),
            [limit],
        )
        .await
    }

    async fn update(&self, id: &RecordId, payload: Map<String, Value>) -> Result<SyncRecord> {
        let mut record = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} record {id}", self.table())))?;

        // Keep updated_at strictly after created_at so the row reads as an update.
        let now = Utc::now().max(record.updated_at + chrono::Duration::milliseconds(1));
        record.payload = payload;
        record.updated_at = now;
        record.action = SyncAction::Update;

        self.conn
            .execute(
                &format!(
                    "UPDATE \"{}\" SET payload = ?, updated_at = ? WHERE id = ?",
                    self.table()
                ),
                params![
                    serde_json::to_string(&record.payload)?,
                    now.timestamp_millis(),
                    id.as_str()
                ],
            )
            .await?;
        Ok(record)
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        let affected = self
            .conn
            .execute(
                &format!(
                    "UPDATE \"{}\" SET is_deleted = 1, updated_at = MAX(updated_at + 1, ?)
                     WHERE id = ? AND is_deleted = 0",
                    self.table()
                ),
                params![Utc::now().timestamp_millis(), id.as_str()],
            )
            .await?;
        if affected == 0 {
            return Err(Error::NotFound(format!("{} record {id}", self.table())));
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT COUNT(*) FROM \"{}\" WHERE is_deleted = 0",
                    self.table()
                ),
                (),
            )
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn changes_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SyncRecord>> {
        let records = match since {
            Some(since) => {
                self.query_records(
                    &format!(
                        "SELECT id, payload, created_at, updated_at, is_deleted
                         FROM \"{}\" WHERE updated_at > ?",
                        self.table()
                    ),
                    [since.timestamp_millis()],
                )
                .await?
            }
            None => {
                self.query_records(
                    &format!(
                        "SELECT id, payload, created_at, updated_at, is_deleted FROM \"{}\"",
                        self.table()
                    ),
                    (),
                )
                .await?
            }
        };
        tracing::debug!(table = self.table(), records = records.len(), "Read change set");
        Ok(records)
    }

    async fn upsert(&self, record: &SyncRecord) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO \"{}\" (id, payload, created_at, updated_at, is_deleted)
                     VALUES (?, ?, ?, ?, 0)
                     ON CONFLICT(id) DO UPDATE SET
                        payload = excluded.payload,
                        created_at = excluded.created_at,
                        updated_at = excluded.updated_at,
                        is_deleted = 0",
                    self.table()
                ),
                params![
                    record.id.as_str(),
                    serde_json::to_string(&record.payload)?,
                    record.created_at.timestamp_millis(),
                    record.updated_at.timestamp_millis()
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert(&self, record: &SyncRecord) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO \"{}\" (id, payload, created_at, updated_at, is_deleted)
                     VALUES (?, ?, ?, ?, ?)",
                    self.table()
                ),
                params![
                    record.id.as_str(),
                    serde_json::to_string(&record.payload)?,
                    record.created_at.timestamp_millis(),
                    record.updated_at.timestamp_millis(),
                    i64::from(record.is_delete())
                ],
            )
            .await?;
        Ok(())
    }

    async fn purge(&self, id: &RecordId) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                &format!("DELETE FROM \"{}\" WHERE id = ?", self.table()),
                [id.as_str()],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn purge_all(&self) -> Result<u64> {
        let affected = self
            .conn
            .execute(&format!("DELETE FROM \"{}\"", self.table()), ())
            .await?;
        Ok(affected)
    }
}
