//! Node-level sync health record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the most recent orchestrator run as last persisted.
///
/// `Syncing` only means a run wrote that phase and has not written another
/// one yet. After a crash it stays behind; schedulers treat a leftover
/// `Syncing` exactly like `Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Pending,
    Syncing,
    Success,
    Failed,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Singleton health document of this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub phase: SyncPhase,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub pending_record_count: u64,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update merged into a [`NodeStatus`].
///
/// `last_error: Some(None)` clears the stored error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStatusPatch {
    pub phase: Option<SyncPhase>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub pending_record_count: Option<u64>,
    pub last_error: Option<Option<String>>,
    pub retry_count: Option<u32>,
}

impl NodeStatus {
    /// Default document written on first boot.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            phase: SyncPhase::Pending,
            last_synced_at: None,
            pending_record_count: 0,
            last_error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the last run failed or no run has completed yet.
    pub const fn is_sync_needed(&self) -> bool {
        matches!(self.phase, SyncPhase::Failed | SyncPhase::Pending)
    }

    pub fn merge(&mut self, patch: NodeStatusPatch, now: DateTime<Utc>) {
        if let Some(phase) = patch.phase {
            self.phase = phase;
        }
        if let Some(last_synced_at) = patch.last_synced_at {
            self.last_synced_at = Some(last_synced_at);
        }
        if let Some(count) = patch.pending_record_count {
            self.pending_record_count = count;
        }
        if let Some(last_error) = patch.last_error {
            self.last_error = last_error;
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        self.updated_at = now;
    }

    pub fn success_patch(count: u64, now: DateTime<Utc>) -> NodeStatusPatch {
        NodeStatusPatch {
            phase: Some(SyncPhase::Success),
            last_synced_at: Some(now),
            pending_record_count: Some(count),
            last_error: Some(None),
            retry_count: Some(0),
        }
    }

    pub fn failure_patch(&self, error: impl Into<String>) -> NodeStatusPatch {
        NodeStatusPatch {
            phase: Some(SyncPhase::Failed),
            last_error: Some(Some(error.into())),
            retry_count: Some(self.retry_count.saturating_add(1)),
            ..NodeStatusPatch::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_needed_only_for_pending_and_failed() {
        let mut status = NodeStatus::new(Utc::now());
        assert!(status.is_sync_needed());

        status.phase = SyncPhase::Failed;
        assert!(status.is_sync_needed());

        status.phase = SyncPhase::Success;
        assert!(!status.is_sync_needed());

        status.phase = SyncPhase::Syncing;
        assert!(!status.is_sync_needed());
    }

    #[test]
    fn merge_clears_error_and_stamps_updated_at() {
        let created = Utc::now();
        let mut status = NodeStatus::new(created);
        let failure = status.failure_patch("boom");
        status.merge(failure, created);
        assert_eq!(status.retry_count, 1);
        assert_eq!(status.last_error.as_deref(), Some("boom"));

        let later = created + chrono::Duration::seconds(5);
        status.merge(NodeStatus::success_patch(7, later), later);
        assert_eq!(status.phase, SyncPhase::Success);
        assert_eq!(status.retry_count, 0);
        assert_eq!(status.last_error, None);
        assert_eq!(status.pending_record_count, 7);
        assert_eq!(status.last_synced_at, Some(later));
        assert_eq!(status.updated_at, later);
        assert_eq!(status.created_at, created);
    }
}
