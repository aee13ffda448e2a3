//! SQLite access with per-database write serialization and busy retries.
//!
//! - Each database path gets one **write mutex**; writers hold it for the whole
//!   transaction, so field create/delete/reorder on a module never interleave
//!   inside this process.
//! - Every write runs in a `BEGIN IMMEDIATE` transaction. SQLite takes the
//!   reserved lock up front, which extends the same serialization to other
//!   processes sharing the file.
//! - Reads open a fresh connection without the mutex (WAL allows concurrent readers).
//!
//! Connections are opened fresh per call, never cached.

use crate::core::db;
use crate::core::error::ForgeError;
use rusqlite::{Connection, TransactionBehavior};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::Duration;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 50;
/// Maximum delay cap (milliseconds).
const MAX_DELAY_MS: u64 = 2_000;

/// Per-database entry holding a write mutex for serialized write access.
struct PoolEntry {
    write_lock: Mutex<()>,
    db_path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub busy_timeout_secs: u64,
    pub max_retries: u32,
}

pub struct SqlitePool {
    entries: Mutex<HashMap<PathBuf, &'static PoolEntry>>,
}

impl SqlitePool {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get_entry(&self, db_path: &Path) -> Result<&'static PoolEntry, ForgeError> {
        let key = db_path.to_path_buf();
        let mut entries = self.entries.lock().map_err(|_| {
            ForgeError::Validation("SqlitePool entries lock poisoned".to_string())
        })?;
        if let Some(entry) = entries.get(&key) {
            return Ok(*entry);
        }
        // One entry per distinct database for the life of the process.
        let entry = Box::leak(Box::new(PoolEntry {
            write_lock: Mutex::new(()),
            db_path: key.clone(),
        }));
        entries.insert(key, entry);
        Ok(entry)
    }

    /// Run `f` inside an IMMEDIATE transaction: commit on `Ok`, roll back on `Err`.
    /// Busy/locked failures re-run the whole transaction with backoff.
    pub fn with_write<F, R>(
        &self,
        db_path: &Path,
        settings: PoolSettings,
        mut f: F,
    ) -> Result<R, ForgeError>
    where
        F: FnMut(&Connection) -> Result<R, ForgeError>,
    {
        let entry = self.get_entry(db_path)?;
        let _guard = entry
            .write_lock
            .lock()
            .map_err(|_| ForgeError::Validation("Pool write lock poisoned".to_string()))?;

        retry_on_busy(settings.max_retries, || {
            let mut conn =
                db::db_connect(&entry.db_path.to_string_lossy(), settings.busy_timeout_secs)?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
    }

    /// Run `f` with a plain read connection (no mutex serialization).
    pub fn with_read<F, R>(
        &self,
        db_path: &Path,
        settings: PoolSettings,
        f: F,
    ) -> Result<R, ForgeError>
    where
        F: FnOnce(&Connection) -> Result<R, ForgeError>,
    {
        let conn = db::db_connect(&db_path.to_string_lossy(), settings.busy_timeout_secs)?;
        f(&conn)
    }
}

fn retry_on_busy<F, R>(max_retries: u32, mut f: F) -> Result<R, ForgeError>
where
    F: FnMut() -> Result<R, ForgeError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if is_busy_error(&e) && attempt < max_retries => {
                attempt += 1;
                let delay_ms = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(MAX_DELAY_MS);
                tracing::warn!(attempt, delay_ms, "sqlite busy, retrying write transaction");
                thread::sleep(Duration::from_millis(delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Check if an error is a SQLite busy/locked error that is retryable.
fn is_busy_error(err: &ForgeError) -> bool {
    match err {
        ForgeError::Rusqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

/// Global pool instance (same lifetime as the process).
pub fn global_pool() -> &'static SqlitePool {
    static POOL: OnceLock<SqlitePool> = OnceLock::new();
    POOL.get_or_init(SqlitePool::new)
}
