//! Engine configuration loaded from `<root>/recordforge.toml`.
//!
//! Every key is optional. A missing file means defaults; a file that fails
//! to parse is a hard error rather than a silent fallback.

use crate::core::error::ForgeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "recordforge.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite file name, relative to the store root.
    pub database: String,
    /// Append one JSONL line per broker operation to `broker.events.jsonl`.
    pub audit_log: bool,
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    pub storage: StorageConfig,
    pub bootstrap: BootstrapConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub busy_timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Canonical name of the module backfilled from the legacy table.
    pub module_name: String,
    pub legacy_table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Field key whose values are counted in `ModuleStats::by_status`.
    pub status_field: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: "recordforge.db".to_string(),
            audit_log: true,
            log_filter: "recordforge=info".to_string(),
            storage: StorageConfig::default(),
            bootstrap: BootstrapConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_secs: 5,
            max_retries: 5,
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            module_name: "Clients".to_string(),
            legacy_table: "legacy_clients".to_string(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            status_field: "status".to_string(),
        }
    }
}

/// Load the config for a store root. No file means defaults.
pub fn load_config(root: &Path) -> Result<EngineConfig, ForgeError> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = fs::read_to_string(&config_path)?;
    let config: EngineConfig = toml::from_str(&content)
        .map_err(|e| ForgeError::Config(format!("{}: {}", config_path.display(), e)))?;
    validate_config(&config)?;
    Ok(config)
}

pub(crate) fn validate_config(config: &EngineConfig) -> Result<(), ForgeError> {
    if config.database.trim().is_empty() {
        return Err(ForgeError::Config("`database` must not be empty".to_string()));
    }
    let table_ok = !config.bootstrap.legacy_table.is_empty()
        && config
            .bootstrap
            .legacy_table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !table_ok {
        return Err(ForgeError::Config(format!(
            "`bootstrap.legacy_table` must be a plain SQL identifier, got '{}'",
            config.bootstrap.legacy_table
        )));
    }
    if config.bootstrap.module_name.trim().is_empty() {
        return Err(ForgeError::Config(
            "`bootstrap.module_name` must not be empty".to_string(),
        ));
    }
    Ok(())
}
