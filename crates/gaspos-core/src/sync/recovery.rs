//! Detection of an empty replica and full, watermark-bypassing recovery

use chrono::{DateTime, Utc};
use libsql::Connection;

use crate::db::{LibSqlRecordRepository, RecordRepository};
use crate::error::Result;
use crate::services::DatabaseService;
use crate::util::millis_to_datetime;

use super::applier::RecordApplier;
use super::report::TableOutcome;
use super::resolver::ConflictResolver;
use super::transport::SyncTransport;
use super::watermark::WatermarkStore;
use super::{TableRegistry, TableSpec};

/// Why the replica needs recovery, if it does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryReason {
    NoWatermarks,
    EmptyTable(String),
    Unreadable(String),
}

impl std::fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoWatermarks => f.write_str("no table has ever been synced"),
            Self::EmptyTable(table) => write!(f, "critical table {table} is empty"),
            Self::Unreadable(error) => write!(f, "local store is unreadable: {error}"),
        }
    }
}

/// Inspect the replica. A failing count query counts as needing recovery.
pub async fn check(conn: &Connection, registry: &TableRegistry) -> Option<RecoveryReason> {
    match WatermarkStore::new(conn).count().await {
        Ok(0) => return Some(RecoveryReason::NoWatermarks),
        Ok(_) => {}
        Err(error) => return Some(RecoveryReason::Unreadable(error.to_string())),
    }

    for spec in registry.iter().filter(|spec| spec.is_critical()) {
        match LibSqlRecordRepository::new(conn, spec).count().await {
            Ok(0) => return Some(RecoveryReason::EmptyTable(spec.name().to_string())),
            Ok(_) => {}
            Err(error) => return Some(RecoveryReason::Unreadable(error.to_string())),
        }
    }
    None
}

pub async fn needs_recovery(conn: &Connection, registry: &TableRegistry) -> bool {
    check(conn, registry).await.is_some()
}

/// Fully pull every registered table from the remote.
///
/// Best effort: a failing table is recorded and the remaining tables are
/// still attempted.
pub async fn perform_recovery<T: SyncTransport>(
    db: &DatabaseService,
    transport: &T,
    started_at: DateTime<Utc>,
) -> Vec<TableOutcome> {
    let mut outcomes = Vec::with_capacity(db.registry().len());
    for spec in db.registry().iter() {
        let outcome = match recover_table(db, transport, spec, started_at).await {
            Ok(outcome) => {
                tracing::info!(table = spec.name(), records = outcome.pulled, "Recovered table");
                outcome
            }
            Err(error) => {
                tracing::warn!(table = spec.name(), "Recovery failed: {error}");
                TableOutcome::new(spec.name()).failed(error)
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

async fn recover_table<T: SyncTransport>(
    db: &DatabaseService,
    transport: &T,
    spec: &TableSpec,
    started_at: DateTime<Utc>,
) -> Result<TableOutcome> {
    let records = transport.pull(spec.name(), None).await?;

    let guard = db.lock().await;
    let conn = guard.connection();
    let had_local_rows = LibSqlRecordRepository::new(conn, spec).count().await? > 0;

    let mut outcome = TableOutcome::new(spec.name());
    if spec.is_authoritative() {
        outcome.pulled = ConflictResolver::new(conn, spec)?
            .replace_all(&records)
            .await?;
    } else {
        let report = RecordApplier::new(conn, db.registry())
            .apply_batch(spec.name(), &records)
            .await?;
        outcome.pulled = report.applied;
        if let Some(first) = report.first_error() {
            return Ok(outcome.failed(format!(
                "{} of {} records failed to apply: {}",
                report.errors.len(),
                records.len(),
                first.error
            )));
        }
    }

    // Rows that existed before recovery may never have reached the remote;
    // an epoch watermark makes the next incremental run push them.
    let watermark = if had_local_rows && !spec.is_authoritative() {
        millis_to_datetime(0)
    } else {
        started_at
    };
    WatermarkStore::new(conn).set(spec.name(), watermark).await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncRecord;
    use serde_json::Map;

    async fn service() -> DatabaseService {
        DatabaseService::open_in_memory(TableRegistry::standard())
            .await
            .unwrap()
    }

    async fn fill_critical_tables(db: &DatabaseService) {
        let guard = db.lock().await;
        for spec in db.registry().iter().filter(|spec| spec.is_critical()) {
            LibSqlRecordRepository::new(guard.connection(), spec)
                .upsert(&SyncRecord::new("seed".parse().unwrap(), Map::new()))
                .await
                .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fresh_replica_needs_recovery() {
        let db = service().await;
        let guard = db.lock().await;
        assert_eq!(
            check(guard.connection(), db.registry()).await,
            Some(RecoveryReason::NoWatermarks)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_critical_table_triggers_recovery_despite_watermarks() {
        let db = service().await;
        fill_critical_tables(&db).await;
        for spec in db.registry().iter() {
            db.set_watermark(spec.name(), Utc::now()).await.unwrap();
        }
        {
            let guard = db.lock().await;
            assert!(!needs_recovery(guard.connection(), db.registry()).await);
        }

        db.lock()
            .await
            .connection()
            .execute("DELETE FROM users", ())
            .await
            .unwrap();

        let guard = db.lock().await;
        assert_eq!(
            check(guard.connection(), db.registry()).await,
            Some(RecoveryReason::EmptyTable("users".to_string()))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreadable_store_needs_recovery() {
        let db = service().await;
        fill_critical_tables(&db).await;
        db.set_watermark("stock", Utc::now()).await.unwrap();

        db.lock()
            .await
            .connection()
            .execute("DROP TABLE transactions", ())
            .await
            .unwrap();

        let guard = db.lock().await;
        assert!(matches!(
            check(guard.connection(), db.registry()).await,
            Some(RecoveryReason::Unreadable(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_non_critical_empty_table_does_not_trigger_recovery() {
        let db = service().await;
        fill_critical_tables(&db).await;
        db.set_watermark("stock", Utc::now()).await.unwrap();

        assert_eq!(db.count_records("discount_types").await.unwrap(), 0);
        let guard = db.lock().await;
        assert_eq!(check(guard.connection(), db.registry()).await, None);
    }
}
