use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use gaspos_core::SyncSettings;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<gaspos_core::Error> for ConfigError {
    fn from(error: gaspos_core::Error) -> Self {
        Self::Invalid(error.to_string())
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub status_path: PathBuf,
    /// Shared secret every exchange request must carry.
    pub api_key: String,
    pub sync: SyncSettings,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("status_path", &self.status_path)
            .field("api_key", &"[REDACTED]")
            .field("sync", &self.sync)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "GASPOS_API_BIND_ADDR", "127.0.0.1:8080");
        if !bind_addr.contains(':') {
            return Err(ConfigError::Invalid(
                "GASPOS_API_BIND_ADDR must look like host:port".to_string(),
            ));
        }

        let db_path = PathBuf::from(value_or_default(&lookup, "GASPOS_DB_PATH", "gaspos.db"));
        let status_path = PathBuf::from(value_or_default(
            &lookup,
            "GASPOS_STATUS_PATH",
            "sync_status.json",
        ));

        let api_key = required_trimmed(&lookup, "GASPOS_SYNC_API_KEY")?;
        if api_key.len() < 16 {
            return Err(ConfigError::Invalid(
                "GASPOS_SYNC_API_KEY must be at least 16 characters".to_string(),
            ));
        }

        let sync = SyncSettings::from_lookup(&lookup)?;

        Ok(Self {
            bind_addr,
            db_path,
            status_path,
            api_key,
            sync,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_api_key() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("GASPOS_SYNC_API_KEY"));
    }

    #[test]
    fn config_rejects_short_api_key() {
        let err = config(&[("GASPOS_SYNC_API_KEY", "short")]).unwrap_err();
        assert!(err.to_string().contains("at least 16"));
    }

    #[test]
    fn config_applies_defaults_and_embeds_sync_settings() {
        let config = config(&[
            ("GASPOS_SYNC_API_KEY", "0123456789abcdef"),
            ("GASPOS_ROLE", "master"),
            ("GASPOS_NODE_ID", "hq"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("gaspos.db"));
        assert_eq!(config.sync.node_id, "hq");
        assert_eq!(config.sync.role.as_str(), "master");
    }

    #[test]
    fn config_surfaces_invalid_sync_settings() {
        let err = config(&[
            ("GASPOS_SYNC_API_KEY", "0123456789abcdef"),
            ("GASPOS_MASTER_URL", "ftp://hq"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("GASPOS_MASTER_URL"));
    }

    #[test]
    fn config_redacts_sensitive_debug_fields() {
        let config = config(&[("GASPOS_SYNC_API_KEY", "sensitive-shared-secret")]).unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-shared-secret"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
