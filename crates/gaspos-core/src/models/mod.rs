//! Data models for Gaspos replication

mod record;
mod status;

pub use record::{wire_timestamp, RecordId, SyncAction, SyncRecord};
pub use status::{NodeStatus, NodeStatusPatch, SyncPhase};
