//! One-shot bootstrap of a module from a legacy, hard-coded record type.
//!
//! The first run for an account creates the module, its canonical fields and a
//! copy of every legacy row, all inside one IMMEDIATE transaction. The module
//! row is written as `provisioning` and flipped to `ready` last, so readers
//! never see it half-built. Later runs are no-ops once a ready module with the
//! canonical name exists. A `provisioning` module left behind by a run that
//! did not finish (e.g. a database written by a tool without transactions) is
//! purged and rebuilt; fields and records are never duplicated.

use crate::core::broker::DbBroker;
use crate::core::error::ForgeError;
use crate::core::store::{AccountScope, Store};
use crate::core::time;
use crate::engine::field_types::FieldType;
use crate::engine::records::{self, Submission, WritePolicy};
use crate::engine::schema::{self, FieldSpec, MODULE_STATE_PROVISIONING, MODULE_STATE_READY, Module};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Where pre-module data comes from.
pub trait LegacySource {
    fn describe(&self) -> String;

    /// Legacy rows of the account, already keyed by the canonical field keys.
    fn load_rows(&self, conn: &Connection, scope: &AccountScope) -> Result<Vec<Submission>, ForgeError>;
}

/// The old `legacy_clients` table (or a configured table of the same shape).
pub struct LegacyClientTable {
    table: String,
}

/// Columns copied 1:1 onto field keys of the same name.
const LEGACY_CLIENT_COLUMNS: [&str; 8] = [
    "name",
    "email",
    "phone",
    "company",
    "status",
    "contract_value",
    "website",
    "notes",
];

impl LegacyClientTable {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
        }
    }
}

impl LegacySource for LegacyClientTable {
    fn describe(&self) -> String {
        format!("table:{}", self.table)
    }

    fn load_rows(&self, conn: &Connection, scope: &AccountScope) -> Result<Vec<Submission>, ForgeError> {
        let exists = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![self.table],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(Vec::new());
        }

        // table name is checked to be a plain identifier when config is loaded
        let sql = format!(
            "SELECT {} FROM {} WHERE account_id = ?1 ORDER BY created_at ASC, id ASC",
            LEGACY_CLIENT_COLUMNS.join(", "),
            self.table
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![scope.account_id()], |row| {
            let mut out = Submission::new();
            for (idx, column) in LEGACY_CLIENT_COLUMNS.iter().enumerate() {
                let value = match row.get_ref(idx)? {
                    rusqlite::types::ValueRef::Null => continue,
                    rusqlite::types::ValueRef::Integer(i) => JsonValue::from(i),
                    rusqlite::types::ValueRef::Real(f) => JsonValue::from(f),
                    rusqlite::types::ValueRef::Text(t) => {
                        JsonValue::String(String::from_utf8_lossy(t).into_owned())
                    }
                    rusqlite::types::ValueRef::Blob(_) => continue,
                };
                out.insert(column.to_string(), value);
            }
            Ok(out)
        })?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

/// Canonical field set of the Clients module, in display order.
pub fn client_template() -> Vec<FieldSpec> {
    vec![
        FieldSpec::of_type(FieldType::Text)
            .keyed("name")
            .label("Name")
            .required()
            .system()
            .span(2),
        FieldSpec::of_type(FieldType::Email)
            .keyed("email")
            .label("Email")
            .unique()
            .system(),
        FieldSpec::of_type(FieldType::Phone).keyed("phone").label("Phone"),
        FieldSpec::of_type(FieldType::Text).keyed("company").label("Company"),
        FieldSpec::of_type(FieldType::Select)
            .keyed("status")
            .label("Status")
            .choices(&["lead", "active", "inactive", "churned"])
            .default_value(JsonValue::from("lead"))
            .system(),
        FieldSpec::of_type(FieldType::Currency)
            .keyed("contract_value")
            .label("Contract Value"),
        FieldSpec::of_type(FieldType::Url).keyed("website").label("Website"),
        FieldSpec::of_type(FieldType::Longtext)
            .keyed("notes")
            .label("Notes")
            .span(3),
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapOutcome {
    pub module: Module,
    /// False when the module already existed and nothing was written.
    pub created: bool,
    /// True when a leftover provisioning module was purged first.
    pub repaired: bool,
    pub fields_created: usize,
    pub records_copied: usize,
}

/// Bootstrap the configured Clients module from the configured legacy table.
pub fn bootstrap_clients(store: &Store, scope: &AccountScope) -> Result<BootstrapOutcome, ForgeError> {
    let source = LegacyClientTable::new(&store.config.bootstrap.legacy_table);
    ensure_module(
        store,
        scope,
        &store.config.bootstrap.module_name,
        &client_template(),
        &source,
    )
}

pub fn ensure_module(
    store: &Store,
    scope: &AccountScope,
    name: &str,
    template: &[FieldSpec],
    source: &dyn LegacySource,
) -> Result<BootstrapOutcome, ForgeError> {
    let name = name.trim();
    let broker = DbBroker::new(store);
    broker.with_write(scope, "module.bootstrap", |conn| {
        if let Some(module) = schema::module_by_name(conn, scope, name, MODULE_STATE_READY)? {
            tracing::debug!(module_id = %module.id, name, "bootstrap skipped, module exists");
            return Ok(BootstrapOutcome {
                module,
                created: false,
                repaired: false,
                fields_created: 0,
                records_copied: 0,
            });
        }

        let repaired = match schema::module_by_name(conn, scope, name, MODULE_STATE_PROVISIONING)? {
            Some(stale) => {
                tracing::warn!(module_id = %stale.id, name, "purging partially provisioned module");
                purge_module(conn, &stale.id)?;
                true
            }
            None => false,
        };

        let module = schema::insert_module(conn, scope, name, MODULE_STATE_PROVISIONING)?;
        for spec in template {
            schema::insert_field(conn, &module.id, spec)?;
        }
        let fields = schema::fields_for_module(conn, &module.id)?;

        let rows = source.load_rows(conn, scope)?;
        for row in &rows {
            records::insert_record(conn, &module.id, &fields, row, WritePolicy::Backfill)?;
        }

        conn.execute(
            "UPDATE modules SET state = ?1 WHERE id = ?2",
            params![MODULE_STATE_READY, module.id],
        )?;

        tracing::info!(
            module_id = %module.id,
            name,
            source = %source.describe(),
            fields = fields.len(),
            records = rows.len(),
            "module bootstrapped"
        );
        Ok(BootstrapOutcome {
            module,
            created: true,
            repaired,
            fields_created: fields.len(),
            records_copied: rows.len(),
        })
    })
}

fn purge_module(conn: &Connection, module_id: &str) -> Result<(), ForgeError> {
    conn.execute(
        "DELETE FROM record_unique_values WHERE module_id = ?1",
        params![module_id],
    )?;
    conn.execute("DELETE FROM records WHERE module_id = ?1", params![module_id])?;
    conn.execute("DELETE FROM fields WHERE module_id = ?1", params![module_id])?;
    conn.execute("DELETE FROM modules WHERE id = ?1", params![module_id])?;
    Ok(())
}

/// One row of the legacy client table.
#[derive(Debug, Clone, Default)]
pub struct LegacyClient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub status: Option<String>,
    pub contract_value: Option<f64>,
    pub website: Option<String>,
    pub notes: Option<String>,
}

/// Write rows into the legacy table, e.g. when importing data that predates
/// runtime modules.
pub fn insert_legacy_clients(
    store: &Store,
    scope: &AccountScope,
    clients: &[LegacyClient],
) -> Result<usize, ForgeError> {
    let broker = DbBroker::new(store);
    let table = store.config.bootstrap.legacy_table.clone();
    broker.with_write(scope, "legacy.insert", |conn| {
        conn.execute(
            &crate::core::schemas::DB_SCHEMA_LEGACY_CLIENTS
                .replace("legacy_clients", &table),
            [],
        )?;
        let sql = format!(
            "INSERT INTO {}(id, account_id, name, email, phone, company, status, contract_value, website, notes, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            table
        );
        let mut stmt = conn.prepare(&sql)?;
        for c in clients {
            stmt.execute(params![
                time::new_id(),
                scope.account_id(),
                c.name,
                c.email,
                c.phone,
                c.company,
                c.status,
                c.contract_value,
                c.website,
                c.notes,
                time::now_epoch_z(),
            ])?;
        }
        Ok(clients.len())
    })
}
