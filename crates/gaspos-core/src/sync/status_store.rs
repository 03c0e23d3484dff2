//! Node status document kept outside the database
//!
//! The document is a small JSON file so "is this node healthy" can still be
//! answered when the database is what's broken.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use crate::error::Result;
use crate::models::{NodeStatus, NodeStatusPatch, SyncPhase};

/// File-backed [`NodeStatus`] store.
#[derive(Debug)]
pub struct NodeStatusStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl NodeStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current status. A missing document is created with defaults.
    pub fn read(&self) -> Result<NodeStatus> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_or_init()
    }

    /// Merge `patch` into the stored status and stamp `updated_at`.
    pub fn write(&self, patch: NodeStatusPatch) -> Result<NodeStatus> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut status = self.load_or_init()?;
        status.merge(patch, Utc::now());
        self.persist(&status)?;
        Ok(status)
    }

    pub fn mark_syncing(&self) -> Result<NodeStatus> {
        self.write(NodeStatusPatch {
            phase: Some(SyncPhase::Syncing),
            ..NodeStatusPatch::default()
        })
    }

    pub fn mark_success(&self, count: u64) -> Result<NodeStatus> {
        self.write(NodeStatus::success_patch(count, Utc::now()))
    }

    pub fn mark_failed(&self, error: impl Into<String>) -> Result<NodeStatus> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut status = self.load_or_init()?;
        let patch = status.failure_patch(error);
        status.merge(patch, Utc::now());
        self.persist(&status)?;
        Ok(status)
    }

    pub fn is_sync_needed(&self) -> Result<bool> {
        Ok(self.read()?.is_sync_needed())
    }

    /// Restore defaults, keeping nothing from the previous document.
    pub fn reset(&self) -> Result<NodeStatus> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let status = NodeStatus::new(Utc::now());
        self.persist(&status)?;
        Ok(status)
    }

    fn load_or_init(&self) -> Result<NodeStatus> {
        if !self.path.exists() {
            let status = NodeStatus::new(Utc::now());
            self.persist(&status)?;
            return Ok(status);
        }

        let raw = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<NodeStatus>(&raw) {
            Ok(status) => Ok(status),
            Err(error) => {
                tracing::warn!(
                    "Node status at {} is unreadable ({error}); starting from defaults",
                    self.path.display()
                );
                Ok(NodeStatus::new(Utc::now()))
            }
        }
    }

    fn persist(&self, status: &NodeStatus) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let serialized = serde_json::to_string_pretty(status)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
