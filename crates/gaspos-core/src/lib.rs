//! gaspos-core - Core library for Gaspos
//!
//! This crate contains the replicated record store, the master/slave sync
//! protocol and the orchestrator shared by the API server and the CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use config::{NodeRole, SyncSettings};
pub use error::{Error, Result};
pub use models::{NodeStatus, RecordId, SyncAction, SyncPhase, SyncRecord};
pub use services::DatabaseService;
