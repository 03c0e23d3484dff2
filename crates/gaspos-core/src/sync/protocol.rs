//! Wire types of the `/api/sync` exchange endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{NodeStatus, SyncRecord};

use super::applier::RecordError;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "X-Sync-API-Key";

/// Table used by `/upload` and `/download` when none is given.
pub const DEFAULT_TRANSFER_TABLE: &str = "transactions";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullQuery {
    pub table: Option<String>,
    pub since: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    pub success: bool,
    pub data: Vec<SyncRecord>,
    pub total_count: usize,
}

/// Pull bodies come either wrapped or as a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PullPayload {
    Envelope { data: Vec<SyncRecord> },
    Bare(Vec<SyncRecord>),
}

impl PullPayload {
    pub(crate) fn into_records(self) -> Vec<SyncRecord> {
        match self {
            Self::Envelope { data } | Self::Bare(data) => data,
        }
    }
}

/// Outgoing push body.
#[derive(Debug, Serialize)]
pub struct PushBody<'a> {
    pub table: &'a str,
    pub data: &'a [SyncRecord],
}

/// Incoming push body. Items stay raw so each one is validated on its own.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushRequest {
    pub table: Option<String>,
    #[serde(default)]
    pub data: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub success: bool,
    pub processed: usize,
    pub total_received: usize,
    #[serde(default)]
    pub errors: Vec<RecordError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgeRequest {
    pub table: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgeResponse {
    pub success: bool,
    pub table: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetRequest {
    pub table: Option<String>,
    #[serde(default)]
    pub all: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatus {
    pub table: String,
    pub record_type: String,
    pub authoritative: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub record_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub node_id: String,
    pub role: String,
    pub node: NodeStatus,
    pub tables: Vec<TableStatus>,
}

/// `{success, data}` wrapper used by the status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table: String,
    pub record_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablesResponse {
    pub success: bool,
    pub data: Vec<TableInfo>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pull_payload_accepts_envelope_and_bare_array() {
        let item = json!({"id": "a", "payload": {"stock": 1}});

        let wrapped: PullPayload =
            serde_json::from_value(json!({"success": true, "data": [item.clone()], "total_count": 1}))
                .unwrap();
        assert_eq!(wrapped.into_records().len(), 1);

        let bare: PullPayload = serde_json::from_value(json!([item])).unwrap();
        assert_eq!(bare.into_records()[0].id.as_str(), "a");
    }

    #[test]
    fn push_response_tolerates_missing_errors() {
        let response: PushResponse = serde_json::from_value(json!({
            "success": true,
            "processed": 2,
            "total_received": 2
        }))
        .unwrap();
        assert!(response.errors.is_empty());
    }
}
