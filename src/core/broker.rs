use crate::core::db;
use crate::core::error::ForgeError;
use crate::core::pool;
use crate::core::store::{AccountScope, Store};
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;

/// The DB Broker is the "Thin Waist" for state access.
///
/// Every schema/record operation goes through `with_write` or `with_read`,
/// which makes sure the schema is current, serializes writers through the pool,
/// and leaves one audit line per operation.
pub struct DbBroker<'a> {
    store: &'a Store,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub account_id: String,
    pub op: String,
    pub db_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<'a> DbBroker<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Execute a mutation inside one IMMEDIATE transaction.
    pub fn with_write<F, R>(&self, scope: &AccountScope, op_name: &str, mut f: F) -> Result<R, ForgeError>
    where
        F: FnMut(&Connection) -> Result<R, ForgeError>,
    {
        let db_path = self.store.db_path();
        let result = pool::global_pool().with_write(&db_path, self.store.pool_settings(), |conn| {
            db::ensure_schema(conn)?;
            f(conn)
        });

        match &result {
            Ok(_) => tracing::info!(op = op_name, account = scope.account_id(), "write committed"),
            Err(e) => tracing::warn!(op = op_name, account = scope.account_id(), error = %e, "write rolled back"),
        }
        // the outcome stands even when the audit line cannot be written
        if let Err(audit_err) = self.log_event(scope, op_name, result.as_ref().err()) {
            tracing::warn!(op = op_name, error = %audit_err, "audit append failed");
        }
        result
    }

    /// Execute a read. Reads are not audited.
    pub fn with_read<F, R>(&self, scope: &AccountScope, op_name: &str, f: F) -> Result<R, ForgeError>
    where
        F: FnOnce(&Connection) -> Result<R, ForgeError>,
    {
        let db_path = self.store.db_path();
        tracing::debug!(op = op_name, account = scope.account_id(), "read");
        pool::global_pool().with_read(&db_path, self.store.pool_settings(), |conn| {
            db::ensure_schema(conn)?;
            f(conn)
        })
    }

    fn log_event(
        &self,
        scope: &AccountScope,
        op: &str,
        err: Option<&ForgeError>,
    ) -> Result<(), ForgeError> {
        if !self.store.config.audit_log {
            return Ok(());
        }

        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_id(),
            account_id: scope.account_id().to_string(),
            op: op.to_string(),
            db_id: self.store.config.database.clone(),
            status: if err.is_none() { "success" } else { "error" }.to_string(),
            error_code: err.map(|e| e.code().to_string()),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.store.audit_log_path())?;
        writeln!(f, "{}", serde_json::to_string(&ev)?)?;
        Ok(())
    }
}

/// Read back the audit log, oldest first.
pub fn read_audit_log(store: &Store) -> Result<Vec<BrokerEvent>, ForgeError> {
    let path = store.audit_log_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(ForgeError::from))
        .collect()
}
