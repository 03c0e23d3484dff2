//! Master/slave replication over HTTP
//!
//! Leaf components (watermarks, node status, change reader, applier,
//! resolver, lease) are driven by [`SyncOrchestrator`] on the slave and by
//! [`ExchangeService`] on the master.

mod applier;
mod changes;
mod exchange;
mod lease;
mod orchestrator;
pub mod protocol;
pub mod recovery;
mod report;
mod resolver;
mod status_store;
mod tables;
mod transport;
mod watermark;

pub use applier::{ApplyReport, RecordApplier, RecordError};
pub use changes::ChangeSetReader;
pub use exchange::ExchangeService;
pub use lease::{LeaseHolder, SyncLease, SYNC_RUN_LEASE};
pub use orchestrator::SyncOrchestrator;
pub use recovery::RecoveryReason;
pub use report::{RunMode, RunReport, RunState, TableOutcome};
pub use resolver::ConflictResolver;
pub use status_store::NodeStatusStore;
pub use tables::{TableRegistry, TableSpec};
pub use transport::{HttpSyncTransport, SyncTransport};
pub use watermark::{Watermark, WatermarkStore};
