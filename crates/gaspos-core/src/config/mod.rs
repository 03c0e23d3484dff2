//! Replication settings shared by the API server and the CLI.
//!
//! Settings are built once from the environment and passed explicitly into
//! the transport client and the orchestrator.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LEASE_TTL_SECS: u64 = 600;

/// Role a node plays in replication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    #[default]
    Slave,
}

impl NodeRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Slave => "slave",
        }
    }
}

impl FromStr for NodeRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(Self::Master),
            "slave" => Ok(Self::Slave),
            other => Err(Error::Configuration(format!(
                "GASPOS_ROLE must be master or slave, got {other:?}"
            ))),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub node_id: String,
    pub role: NodeRole,
    /// Base URL of the master, e.g. `https://hq.example.com`.
    pub master_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub lease_ttl: Duration,
    /// Reject purely numeric record IDs on push.
    pub strict_ids: bool,
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncSettings")
            .field("node_id", &self.node_id)
            .field("role", &self.role)
            .field("master_url", &self.master_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("lease_ttl", &self.lease_ttl)
            .field("strict_ids", &self.strict_ids)
            .finish()
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            node_id: "local".to_string(),
            role: NodeRole::Slave,
            master_url: None,
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            lease_ttl: Duration::from_secs(DEFAULT_LEASE_TTL_SECS),
            strict_ids: false,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let node_id = optional_trimmed(&lookup, "GASPOS_NODE_ID").unwrap_or_else(|| "local".to_string());
        if !node_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Configuration(
                "GASPOS_NODE_ID may only contain letters, digits, '-' and '_'".to_string(),
            ));
        }

        let role = optional_trimmed(&lookup, "GASPOS_ROLE")
            .map(|value| value.parse::<NodeRole>())
            .transpose()?
            .unwrap_or_default();

        let master_url = optional_trimmed(&lookup, "GASPOS_MASTER_URL")
            .map(|value| value.trim_end_matches('/').to_string());
        if let Some(url) = master_url.as_deref() {
            if !is_http_url(url) {
                return Err(Error::Configuration(
                    "GASPOS_MASTER_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        let api_key = optional_trimmed(&lookup, "GASPOS_SYNC_API_KEY");

        let timeout_secs = parse_secs(&lookup, "GASPOS_SYNC_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if !(1..=300).contains(&timeout_secs) {
            return Err(Error::Configuration(
                "GASPOS_SYNC_TIMEOUT_SECS must be in [1, 300]".to_string(),
            ));
        }

        let lease_ttl_secs =
            parse_secs(&lookup, "GASPOS_SYNC_LEASE_TTL_SECS", DEFAULT_LEASE_TTL_SECS)?;
        if !(30..=86_400).contains(&lease_ttl_secs) {
            return Err(Error::Configuration(
                "GASPOS_SYNC_LEASE_TTL_SECS must be in [30, 86400]".to_string(),
            ));
        }

        let strict_ids = optional_trimmed(&lookup, "GASPOS_STRICT_IDS").is_some_and(|value| {
            matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        });

        Ok(Self {
            node_id,
            role,
            master_url,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
            lease_ttl: Duration::from_secs(lease_ttl_secs),
            strict_ids,
        })
    }

    /// Master URL, required by anything that talks to the master.
    pub fn require_master_url(&self) -> Result<&str> {
        self.master_url
            .as_deref()
            .ok_or_else(|| Error::Configuration("GASPOS_MASTER_URL is not set".to_string()))
    }

    /// Shared secret, required on both sides of an exchange.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::Configuration("GASPOS_SYNC_API_KEY is not set".to_string()))
    }
}

fn parse_secs(lookup: impl Fn(&str) -> Option<String>, name: &str, default: u64) -> Result<u64> {
    match optional_trimmed(lookup, name) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| Error::Configuration(format!("{name} must be an integer number of seconds"))),
        None => Ok(default),
    }
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
