//! Store handle and account scoping.
//!
//! A `Store` is a directory holding the engine database, its optional
//! `recordforge.toml`, and the broker audit log. Every schema or record
//! operation additionally takes an `AccountScope`, which can only be built
//! from an authenticated `Session`.

use crate::core::config::{self, EngineConfig};
use crate::core::db;
use crate::core::error::ForgeError;
use crate::core::pool::PoolSettings;
use std::path::{Path, PathBuf};

/// Store handle representing one engine workspace on disk.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
    pub config: EngineConfig,
}

impl Store {
    /// Open a store root, creating the directory and reading `recordforge.toml`.
    pub fn open(root: &Path) -> Result<Self, ForgeError> {
        std::fs::create_dir_all(root)?;
        let config = config::load_config(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn with_config(root: &Path, config: EngineConfig) -> Result<Self, ForgeError> {
        config::validate_config(&config)?;
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        db::engine_db_path(&self.root, &self.config.database)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.root.join("broker.events.jsonl")
    }

    pub(crate) fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            busy_timeout_secs: self.config.storage.busy_timeout_secs,
            max_retries: self.config.storage.max_retries,
        }
    }
}

/// What the authentication collaborator hands us.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub authenticated: bool,
    pub user_id: Option<String>,
}

impl Session {
    pub fn authenticated(user_id: &str) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id.to_string()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Proof that a caller is authenticated, carrying the account all reads and
/// writes are scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountScope {
    account_id: String,
}

impl AccountScope {
    pub fn from_session(session: &Session) -> Result<Self, ForgeError> {
        if !session.authenticated {
            return Err(ForgeError::Unauthorized);
        }
        match session.user_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(Self {
                account_id: id.to_string(),
            }),
            _ => Err(ForgeError::Unauthorized),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}
