//! Run lease: at most one orchestrator run per database at a time

use std::time::Duration;

use libsql::{params, Connection};

use crate::error::Result;
use crate::util::{millis_to_datetime, now_millis};

/// Lease name taken by every orchestrator run.
pub const SYNC_RUN_LEASE: &str = "sync-run";

/// Current holder of a lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseHolder {
    pub holder: String,
    pub acquired_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Expiring named lock stored in `sync_leases`.
///
/// An expired lease is free to take, so a crashed run blocks others for at
/// most the TTL.
pub struct SyncLease<'a> {
    conn: &'a Connection,
    name: &'a str,
}

impl<'a> SyncLease<'a> {
    pub const fn new(conn: &'a Connection, name: &'a str) -> Self {
        Self { conn, name }
    }

    /// Take the lease for `holder`. Returns the current holder when it is taken.
    pub async fn acquire(&self, holder: &str, ttl: Duration) -> Result<Option<LeaseHolder>> {
        let now = now_millis();
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_millis);

        // Single statement, so two connections cannot both win.
        let affected = self
            .conn
            .execute(
                "INSERT INTO sync_leases (name, holder, acquired_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                    holder = excluded.holder,
                    acquired_at = excluded.acquired_at,
                    expires_at = excluded.expires_at
                 WHERE sync_leases.expires_at <= ?3",
                params![self.name, holder, now, expires_at],
            )
            .await?;

        if affected > 0 {
            tracing::debug!(lease = self.name, holder, "Acquired lease");
            return Ok(None);
        }

        let current = self.current().await?;
        if let Some(current) = &current {
            tracing::warn!(
                lease = self.name,
                holder = %current.holder,
                expires_at = %current.expires_at,
                "Lease is held by another run"
            );
        }
        // The row can vanish between the two statements; report it as busy anyway.
        Ok(Some(current.unwrap_or_else(|| LeaseHolder {
            holder: "unknown".to_string(),
            acquired_at: millis_to_datetime(now),
            expires_at: millis_to_datetime(now),
        })))
    }

    /// Extend the lease by `ttl` from now if `holder` still owns it.
    pub async fn renew(&self, holder: &str, ttl: Duration) -> Result<bool> {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_millis);
        let affected = self
            .conn
            .execute(
                "UPDATE sync_leases SET expires_at = ?1 WHERE name = ?2 AND holder = ?3",
                params![expires_at, self.name, holder],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Release the lease if `holder` still owns it.
    pub async fn release(&self, holder: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM sync_leases WHERE name = ? AND holder = ?",
                [self.name, holder],
            )
            .await?;
        Ok(affected > 0)
    }

    pub async fn current(&self) -> Result<Option<LeaseHolder>> {
        let mut rows = self
            .conn
            .query(
                "SELECT holder, acquired_at, expires_at FROM sync_leases WHERE name = ?",
                [self.name],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(LeaseHolder {
                holder: row.get(0)?,
                acquired_at: millis_to_datetime(row.get(1)?),
                expires_at: millis_to_datetime(row.get(2)?),
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_holder_is_rejected_until_release() {
        let db = Database::open_in_memory().await.unwrap();
        let lease = SyncLease::new(db.connection(), SYNC_RUN_LEASE);
        let ttl = Duration::from_secs(60);

        assert_eq!(lease.acquire("run-a", ttl).await.unwrap(), None);

        let busy = lease.acquire("run-b", ttl).await.unwrap().unwrap();
        assert_eq!(busy.holder, "run-a");

        assert!(!lease.release("run-b").await.unwrap());
        assert!(lease.release("run-a").await.unwrap());
        assert_eq!(lease.acquire("run-b", ttl).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_expired_lease_can_be_taken_over() {
        let db = Database::open_in_memory().await.unwrap();
        let lease = SyncLease::new(db.connection(), SYNC_RUN_LEASE);

        assert_eq!(lease.acquire("crashed", Duration::ZERO).await.unwrap(), None);
        assert_eq!(
            lease
                .acquire("fresh", Duration::from_secs(60))
                .await
                .unwrap(),
            None
        );
        assert_eq!(lease.current().await.unwrap().unwrap().holder, "fresh");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_renewed_lease_stays_with_holder() {
        let db = Database::open_in_memory().await.unwrap();
        let lease = SyncLease::new(db.connection(), SYNC_RUN_LEASE);
        let ttl = Duration::from_secs(60);

        assert_eq!(lease.acquire("long-run", Duration::ZERO).await.unwrap(), None);
        assert!(!lease.renew("other", ttl).await.unwrap());
        assert!(lease.renew("long-run", ttl).await.unwrap());

        let busy = lease.acquire("other", ttl).await.unwrap().unwrap();
        assert_eq!(busy.holder, "long-run");
    }
}
