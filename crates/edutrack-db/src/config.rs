//! # Engine Configuration
//!
//! Settings for the database, reconciliation and logging.
//!
//! ## Load Order (later overrides earlier)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Defaults                                                           │
//! │  2. edutrack.toml (optional)                                           │
//! │  3. Environment variables                                              │
//! │       EDUTRACK_DB_PATH              database.path                      │
//! │       EDUTRACK_DB_MAX_CONNECTIONS   database.max_connections           │
//! │       EDUTRACK_OVER_DELIVERY        reconciliation.over_delivery       │
//! │       EDUTRACK_AUDIT_PAGE_SIZE      audit.page_size                    │
//! │       EDUTRACK_LOG                  logging.filter                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Config File
//! ```toml
//! [database]
//! path = "./data/edutrack.db"
//! max_connections = 5
//! connect_timeout_secs = 30
//!
//! [reconciliation]
//! over_delivery = "reject"
//!
//! [audit]
//! page_size = 50
//!
//! [logging]
//! filter = "edutrack_db=info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use edutrack_core::{OverDeliveryPolicy, DEFAULT_AUDIT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::pool::DbConfig;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

fn default_db_path() -> PathBuf {
    PathBuf::from("./edutrack.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    DEFAULT_AUDIT_PAGE_SIZE
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSettings {
    #[serde(default)]
    pub over_delivery: OverDeliveryPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Entries per page when a page is requested without a limit.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_log_filter(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub reconciliation: ReconciliationSettings,

    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl EngineConfig {
    /// Loads defaults, then the file (if given and present), then the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) if path.exists() => {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                Self::from_toml_str(&contents)?
            }
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document; missing sections fall back to defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies `EDUTRACK_*` overrides read through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup("EDUTRACK_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("EDUTRACK_DB_MAX_CONNECTIONS") {
            self.database.max_connections = max
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EDUTRACK_DB_MAX_CONNECTIONS".to_string()))?;
        }

        if let Some(policy) = lookup("EDUTRACK_OVER_DELIVERY") {
            self.reconciliation.over_delivery = policy
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EDUTRACK_OVER_DELIVERY".to_string()))?;
        }

        if let Some(size) = lookup("EDUTRACK_AUDIT_PAGE_SIZE") {
            self.audit.page_size = size
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EDUTRACK_AUDIT_PAGE_SIZE".to_string()))?;
        }

        if let Some(filter) = lookup("EDUTRACK_LOG") {
            self.logging.filter = filter;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.audit.page_size == 0 {
            return Err(ConfigError::Invalid(
                "audit.page_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Pool settings derived from the `[database]` section.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.reconciliation.over_delivery, OverDeliveryPolicy::Reject);
        assert_eq!(config.audit.page_size, DEFAULT_AUDIT_PAGE_SIZE);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [reconciliation]
            over_delivery = "accept"

            [audit]
            page_size = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.reconciliation.over_delivery, OverDeliveryPolicy::Accept);
        assert_eq!(config.audit.page_size, 10);
        assert_eq!(config.database, DatabaseSettings::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("EDUTRACK_DB_PATH", "/tmp/override.db"),
            ("EDUTRACK_DB_MAX_CONNECTIONS", "8"),
            ("EDUTRACK_OVER_DELIVERY", "ACCEPT"),
            ("EDUTRACK_LOG", "debug"),
        ]);
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.reconciliation.over_delivery, OverDeliveryPolicy::Accept);
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.db_config().max_connections, 8);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|key| (key == "EDUTRACK_AUDIT_PAGE_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name) if name == "EDUTRACK_AUDIT_PAGE_SIZE"));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let config = EngineConfig::from_toml_str("[audit]\npage_size = 0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
