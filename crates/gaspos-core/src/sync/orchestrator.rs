//! Sync orchestrator: recovery check, per-table push and pull, status update
//!
//! A run moves `idle -> checking-recovery -> (recovering | syncing) ->
//! (success | failed)`. Tables are processed one at a time in registry
//! order; a failing table is recorded and the run moves on to the next one.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::services::DatabaseService;

use super::applier::RecordApplier;
use super::changes::ChangeSetReader;
use super::lease::{SyncLease, SYNC_RUN_LEASE};
use super::recovery;
use super::report::{RunMode, RunReport, RunState, TableOutcome};
use super::resolver::ConflictResolver;
use super::status_store::NodeStatusStore;
use super::transport::SyncTransport;
use super::TableSpec;

/// Status sent to the remote once a table is committed locally.
const ACK_COMPLETED: &str = "completed";

pub struct SyncOrchestrator<'a, T> {
    db: &'a DatabaseService,
    status: &'a NodeStatusStore,
    transport: &'a T,
    settings: &'a SyncSettings,
}

impl<'a, T: SyncTransport> SyncOrchestrator<'a, T> {
    pub const fn new(
        db: &'a DatabaseService,
        status: &'a NodeStatusStore,
        transport: &'a T,
        settings: &'a SyncSettings,
    ) -> Self {
        Self {
            db,
            status,
            transport,
            settings,
        }
    }

    /// Run one full cycle under the run lease.
    ///
    /// Table failures are reported in the returned [`RunReport`], not as
    /// `Err`. `Err` means another run holds the lease
    /// ([`Error::SyncInProgress`]) or the local store failed outside the
    /// per-table steps; the latter is also recorded as a failed run in the
    /// node status document.
    pub async fn run(&self) -> Result<RunReport> {
        let holder = format!("{}-{}", self.settings.node_id, Uuid::now_v7());
        let acquired = {
            let guard = self.db.lock().await;
            SyncLease::new(guard.connection(), SYNC_RUN_LEASE)
                .acquire(&holder, self.settings.lease_ttl)
                .await
        };
        match acquired {
            Ok(None) => {}
            Ok(Some(current)) => return Err(Error::SyncInProgress(current.holder)),
            Err(error) => return Err(self.record_fault(error)),
        }

        let result = self.run_with_lease(&holder).await;

        let released = {
            let guard = self.db.lock().await;
            SyncLease::new(guard.connection(), SYNC_RUN_LEASE)
                .release(&holder)
                .await
        };

        match (result, released) {
            (Ok(report), Ok(_)) => Ok(report),
            (Ok(_), Err(error)) => {
                tracing::warn!("Failed to release sync lease {holder}: {error}");
                Err(self.record_fault(error))
            }
            (Err(error), released) => {
                if let Err(release_error) = released {
                    tracing::warn!("Failed to release sync lease {holder}: {release_error}");
                }
                Err(self.record_fault(error))
            }
        }
    }

    /// Record a fault that escaped the per-table steps as a failed run.
    fn record_fault(&self, error: Error) -> Error {
        tracing::error!("Sync run aborted: {error}");
        if let Err(status_error) = self.status.mark_failed(error.to_string()) {
            tracing::warn!("Failed to record sync failure: {status_error}");
        }
        error
    }

    /// Push the lease expiry forward so a long run is not taken over.
    async fn renew_lease(&self, holder: &str) {
        let renewed = {
            let guard = self.db.lock().await;
            SyncLease::new(guard.connection(), SYNC_RUN_LEASE)
                .renew(holder, self.settings.lease_ttl)
                .await
        };
        match renewed {
            Ok(true) => {}
            Ok(false) => tracing::warn!(holder, "Sync lease was taken over during the run"),
            Err(error) => tracing::warn!(holder, "Failed to renew sync lease: {error}"),
        }
    }

    async fn run_with_lease(&self, holder: &str) -> Result<RunReport> {
        let started_at = Utc::now();
        enter(RunState::Idle);
        enter(RunState::CheckingRecovery);
        self.status.mark_syncing()?;

        let reason = {
            let guard = self.db.lock().await;
            recovery::check(guard.connection(), self.db.registry()).await
        };

        let report = if let Some(reason) = reason {
            enter(RunState::Recovering);
            tracing::info!("Replica needs recovery: {reason}");
            let outcomes = recovery::perform_recovery(self.db, self.transport, started_at).await;
            RunReport::from_outcomes(RunMode::Recovery, started_at, outcomes)
        } else {
            enter(RunState::Syncing);
            let mut outcomes = Vec::with_capacity(self.db.registry().len());
            for spec in self.db.registry().iter() {
                self.renew_lease(holder).await;
                outcomes.push(self.sync_table(spec, started_at).await);
            }
            RunReport::from_outcomes(RunMode::Incremental, started_at, outcomes)
        };
        if report.succeeded() {
            self.status.mark_success(report.records_exchanged)?;
        } else {
            let error = report
                .first_error
                .clone()
                .unwrap_or_else(|| "sync failed".to_string());
            self.status.mark_failed(error)?;
        }
        enter(report.state);
        tracing::info!(
            mode = ?report.mode,
            records = report.records_exchanged,
            failed_tables = report.failed_tables().count(),
            "Sync run finished"
        );
        Ok(report)
    }

    async fn sync_table(&self, spec: &TableSpec, started_at: DateTime<Utc>) -> TableOutcome {
        let mut outcome = TableOutcome::new(spec.name());
        match self.exchange_table(spec, started_at, &mut outcome).await {
            Ok(()) => {
                tracing::info!(
                    table = spec.name(),
                    pushed = outcome.pushed,
                    pulled = outcome.pulled,
                    "Table synced"
                );
                outcome
            }
            Err(error) => {
                tracing::warn!(table = spec.name(), "Table sync failed: {error}");
                outcome.failed(error)
            }
        }
    }

    /// Push, then pull, then advance the watermark. Any `Err` leaves the
    /// watermark where it was. A transport failure on push skips the pull.
    async fn exchange_table(
        &self,
        spec: &TableSpec,
        started_at: DateTime<Utc>,
        outcome: &mut TableOutcome,
    ) -> Result<()> {
        let table = spec.name();
        let since = self.db.watermark(table).await?;

        let changes = {
            let guard = self.db.lock().await;
            ChangeSetReader::new(guard.connection(), self.db.registry())
                .changes_since(table, since)
                .await?
        };
        // Rejected records still let the pull run; the table fails afterwards
        // so the watermark stays put and they are sent again next run.
        let mut rejected = None;
        if !changes.is_empty() {
            let response = self.transport.push(table, &changes).await?;
            outcome.pushed = response.processed;
            if let Some(first) = response.errors.first() {
                rejected = Some(format!(
                    "remote rejected {} of {} records: {}",
                    response.errors.len(),
                    response.total_received,
                    first.error
                ));
            }
        }

        if spec.is_authoritative() {
            let records = self.transport.pull(table, None).await?;
            let guard = self.db.lock().await;
            outcome.pulled = ConflictResolver::new(guard.connection(), spec)?
                .replace_all(&records)
                .await?;
        } else {
            let records = self.transport.pull(table, since).await?;
            let guard = self.db.lock().await;
            let report = RecordApplier::new(guard.connection(), self.db.registry())
                .apply_batch(table, &records)
                .await?;
            outcome.pulled = report.applied;
            if let Some(first) = report.first_error() {
                return Err(Error::Sync(format!(
                    "{} of {} pulled records failed to apply: {}",
                    report.errors.len(),
                    records.len(),
                    first.error
                )));
            }
        }

        if let Some(rejected) = rejected {
            return Err(Error::Sync(rejected));
        }

        self.db.set_watermark(table, started_at).await?;

        if let Err(error) = self.transport.acknowledge(table, ACK_COMPLETED).await {
            tracing::warn!(table, "Acknowledge failed: {error}");
        }
        Ok(())
    }
}

fn enter(state: RunState) {
    tracing::info!(state = state.as_str(), "Sync state");
}
