//! Database connection management

use crate::error::Result;
use crate::sync::TableRegistry;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;
use super::record_repository::LibSqlRecordRepository;

/// Database wrapper for libSQL connections
pub struct Database {
    // Dropping the database handle closes the connection, so keep it alive.
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` for optimal performance
    async fn configure(&self) -> Result<()> {
        // journal_mode returns a row and is rejected for in-memory databases.
        self.conn
            .query("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        self.conn
            .execute("PRAGMA busy_timeout = 5000;", ())
            .await
            .ok();
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Create the backing table of every registered synced table.
    pub async fn install_tables(&self, registry: &TableRegistry) -> Result<()> {
        for spec in registry.iter() {
            LibSqlRecordRepository::new(&self.conn, spec)
                .ensure_table()
                .await?;
        }
        Ok(())
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        let mut rows = db.connection().query("SELECT 1", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_install_tables_creates_every_registered_table() {
        let db = Database::open_in_memory().await.unwrap();
        let registry = TableRegistry::standard();
        db.install_tables(&registry).await.unwrap();

        for spec in registry.iter() {
            let mut rows = db
                .connection()
                .query(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
                    [spec.name()],
                )
                .await
                .unwrap();
            let exists = rows
                .next()
                .await
                .unwrap()
                .is_some_and(|row| row.get::<i64>(0).unwrap() != 0);
            assert!(exists, "missing table {}", spec.name());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_file_database_persists_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gaspos.db");
        {
            let db = Database::open(&path).await.unwrap();
            db.install_tables(&TableRegistry::standard()).await.unwrap();
        }
        let reopened = Database::open(&path).await.unwrap();
        let mut rows = reopened
            .connection()
            .query("SELECT COUNT(*) FROM stock", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 0);
    }
}
