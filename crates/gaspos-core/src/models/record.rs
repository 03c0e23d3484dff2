//! Replicated record model and its wire representation

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;

/// Stable identifier of a replicated record.
///
/// Identifiers minted locally are node-scoped (`{node_id}-{uuid v7}`), so two
/// nodes writing independently can never produce the same value. Identifiers
/// received from a remote are kept verbatim; on the wire they may be strings
/// or (legacy) integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Mint a new identifier owned by `node_id`.
    pub fn generate(node_id: &str) -> Self {
        Self(format!("{}-{}", node_id.trim(), Uuid::now_v7()))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Legacy auto-increment identifiers are digits only and may collide across nodes.
    pub fn is_numeric(&self) -> bool {
        self.0.bytes().all(|byte| byte.is_ascii_digit())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput(
                "record identifier must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(text) => text.parse().map_err(serde::de::Error::custom),
            RawId::Number(number) => Ok(Self(number.to_string())),
        }
    }
}

/// Kind of change carried by an exchange item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    #[default]
    Update,
    Delete,
}

impl SyncAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for SyncAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown sync action: {other}"))),
        }
    }
}

/// One record of one synced table, as stored locally and as exchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: RecordId,
    #[serde(default)]
    pub action: SyncAction,
    #[serde(default = "Utc::now", with = "wire_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "wire_timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl SyncRecord {
    /// Build a fresh local record with both timestamps set to now.
    pub fn new(id: RecordId, payload: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id,
            action: SyncAction::Create,
            created_at: now,
            updated_at: now,
            payload,
        }
    }

    /// Decode one item of a pushed batch.
    ///
    /// A missing, null or blank identifier is reported separately from other
    /// shape errors so the caller can surface it as a per-record validation
    /// failure.
    pub fn from_wire(value: Value) -> Result<Self, String> {
        match value.get("id") {
            None | Some(Value::Null) => {
                return Err("record is missing an identifier".to_string());
            }
            Some(Value::String(id)) if id.trim().is_empty() => {
                return Err("record is missing an identifier".to_string());
            }
            Some(_) => {}
        }
        serde_json::from_value(value).map_err(|error| format!("invalid record: {error}"))
    }

    pub fn is_delete(&self) -> bool {
        self.action == SyncAction::Delete
    }
}

/// Millisecond RFC 3339 on the way out, lenient on the way in.
pub mod wire_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::util::{format_timestamp, millis_to_datetime, parse_timestamp};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_timestamp(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTimestamp {
            Text(String),
            Millis(i64),
        }

        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Text(text) => parse_timestamp(&text)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {text}"))),
            RawTimestamp::Millis(millis) => Ok(millis_to_datetime(millis)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_are_node_scoped_and_unique() {
        let first = RecordId::generate("branch-7");
        let second = RecordId::generate("branch-7");
        assert!(first.as_str().starts_with("branch-7-"));
        assert_ne!(first, second);
        assert!(!first.is_numeric());
    }

    #[test]
    fn record_id_accepts_numbers_and_rejects_blank() {
        let numeric: RecordId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(numeric.as_str(), "42");
        assert!(numeric.is_numeric());

        assert!(serde_json::from_value::<RecordId>(json!("  ")).is_err());
        assert!("".parse::<RecordId>().is_err());
    }

    #[test]
    fn from_wire_reports_missing_identifier() {
        let error = SyncRecord::from_wire(json!({"payload": {"stock": 3}})).unwrap_err();
        assert!(error.contains("missing an identifier"));

        let error = SyncRecord::from_wire(json!({"id": "", "payload": {}})).unwrap_err();
        assert!(error.contains("missing an identifier"));
    }

    #[test]
    fn from_wire_defaults_action_to_update() {
        let record = SyncRecord::from_wire(json!({
            "id": 1,
            "created_at": "2024-01-02 03:04:05",
            "updated_at": "2024-01-02T03:04:05.250Z",
            "payload": {"stock": 40, "price": 10}
        }))
        .unwrap();

        assert_eq!(record.id.as_str(), "1");
        assert_eq!(record.action, SyncAction::Update);
        assert_eq!(record.payload.get("stock"), Some(&json!(40)));
        assert_eq!(record.updated_at.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn serialized_timestamps_are_normalized() {
        let mut record = SyncRecord::new("abc".parse().unwrap(), Map::new());
        record.updated_at = crate::util::millis_to_datetime(1_700_000_000_123);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["updated_at"], json!("2023-11-14T22:13:20.123Z"));
        assert_eq!(value["action"], json!("create"));
    }
}
