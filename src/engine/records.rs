//! Record store: validated instances of a module.
//!
//! Writes are checked against the module's current field list:
//! 1. required fields need a non-empty value (`RequiredFieldMissing`);
//! 2. unique fields claim their value in `record_unique_values`, whose primary
//!    key makes the check atomic with the write (`UniqueConstraintViolation`);
//! 3. values are coerced by field type, falling back to the type's empty value.
//!
//! Updates merge: only supplied keys are validated and overwritten.

use crate::core::broker::DbBroker;
use crate::core::error::ForgeError;
use crate::core::store::{AccountScope, Store};
use crate::core::time;
use crate::engine::field_types::FieldType;
use crate::engine::schema::{self, Field};
use crate::engine::values::{FieldValue, ValueMap, json_is_empty};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Raw submission as it arrives from a form or the CLI.
pub type Submission = JsonMap<String, JsonValue>;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Record {
    pub id: String,
    pub module_id: String,
    pub values: ValueMap,
    pub created_at: String,
    pub updated_at: String,
}

impl Record {
    pub fn value(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }
}

/// Case-insensitive substring match on one display field.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub query: String,
    /// Field key to search; defaults to the first `text` field in display order.
    pub display_field: Option<String>,
}

impl RecordFilter {
    pub fn contains(query: &str) -> Self {
        Self {
            query: query.to_string(),
            display_field: None,
        }
    }

    pub fn on(mut self, field_key: &str) -> Self {
        self.display_field = Some(field_key.to_string());
        self
    }
}

/// How strictly an insert is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WritePolicy {
    /// Full required/unique validation.
    Validated,
    /// Legacy backfill: data is taken as-is, colliding unique values stay unindexed.
    Backfill,
}

pub fn create_record(
    store: &Store,
    scope: &AccountScope,
    module_id: &str,
    submission: &Submission,
) -> Result<Record, ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_write(scope, "record.create", |conn| {
        schema::require_module(conn, scope, module_id)?;
        let fields = schema::fields_for_module(conn, module_id)?;
        insert_record(conn, module_id, &fields, submission, WritePolicy::Validated)
    })
}

pub fn update_record(
    store: &Store,
    scope: &AccountScope,
    record_id: &str,
    submission: &Submission,
) -> Result<Record, ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_write(scope, "record.update", |conn| {
        let stored = require_record_row(conn, scope, record_id)?;
        let fields = schema::fields_for_module(conn, &stored.module_id)?;
        reject_unknown_keys(&fields, submission)?;

        for field in &fields {
            if let Some(raw) = submission.get(&field.field_key) {
                if field.is_required && json_is_empty(raw) {
                    return Err(ForgeError::RequiredFieldMissing(field.field_key.clone()));
                }
            }
        }

        let mut data = stored.data.clone();
        let mut touched: Vec<(&Field, FieldValue)> = Vec::new();
        for field in &fields {
            if let Some(raw) = submission.get(&field.field_key) {
                let value = field.field_type.coerce(raw);
                data.insert(field.field_key.clone(), value.to_json());
                touched.push((field, value));
            }
        }

        let ts = time::now_epoch_z();
        conn.execute(
            "UPDATE records SET data = ?1, updated_at = ?2 WHERE id = ?3",
            params![JsonValue::Object(data.clone()).to_string(), ts, record_id],
        )?;

        for (field, value) in touched.iter().filter(|(f, _)| f.is_unique) {
            conn.execute(
                "DELETE FROM record_unique_values WHERE record_id = ?1 AND field_key = ?2",
                params![record_id, field.field_key],
            )?;
            if let Some(value_key) = value.unique_key() {
                schema::claim_unique_value(
                    conn,
                    &stored.module_id,
                    &field.field_key,
                    &value_key,
                    record_id,
                )?;
            }
        }

        tracing::info!(record_id, keys = touched.len(), "record updated");
        Ok(interpret(
            &fields,
            RecordRow {
                updated_at: ts,
                data,
                ..stored
            },
        ))
    })
}

pub fn delete_record(store: &Store, scope: &AccountScope, record_id: &str) -> Result<(), ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_write(scope, "record.delete", |conn| {
        require_record_row(conn, scope, record_id)?;
        conn.execute(
            "DELETE FROM record_unique_values WHERE record_id = ?1",
            params![record_id],
        )?;
        conn.execute("DELETE FROM records WHERE id = ?1", params![record_id])?;
        tracing::info!(record_id, "record deleted");
        Ok(())
    })
}

pub fn get_record(store: &Store, scope: &AccountScope, record_id: &str) -> Result<Record, ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_read(scope, "record.get", |conn| {
        let row = require_record_row(conn, scope, record_id)?;
        let fields = schema::fields_for_module(conn, &row.module_id)?;
        Ok(interpret(&fields, row))
    })
}

/// All records of a module, oldest first, optionally filtered in memory.
pub fn list_records(
    store: &Store,
    scope: &AccountScope,
    module_id: &str,
    filter: Option<&RecordFilter>,
) -> Result<Vec<Record>, ForgeError> {
    let broker = DbBroker::new(store);
    let (fields, rows) = broker.with_read(scope, "record.list", |conn| {
        schema::require_module(conn, scope, module_id)?;
        let fields = schema::fields_for_module(conn, module_id)?;
        let rows = record_rows_for_module(conn, module_id)?;
        Ok((fields, rows))
    })?;

    let records: Vec<Record> = rows.into_iter().map(|row| interpret(&fields, row)).collect();
    match filter {
        Some(f) if !f.query.trim().is_empty() => apply_filter(&fields, records, f),
        _ => Ok(records),
    }
}

fn apply_filter(
    fields: &[Field],
    records: Vec<Record>,
    filter: &RecordFilter,
) -> Result<Vec<Record>, ForgeError> {
    let key = match filter.display_field.as_deref() {
        Some(key) => {
            if !fields.iter().any(|f| f.field_key == key) {
                return Err(ForgeError::UnknownField(key.to_string()));
            }
            key.to_string()
        }
        None => match default_display_field(fields) {
            Some(f) => f.field_key.clone(),
            // nothing to search on
            None => return Ok(records),
        },
    };

    let needle = filter.query.trim().to_lowercase();
    Ok(records
        .into_iter()
        .filter(|r| {
            r.value(&key)
                .map(|v| v.display_text().to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .collect())
}

pub fn default_display_field(fields: &[Field]) -> Option<&Field> {
    fields.iter().find(|f| f.field_type == FieldType::Text)
}

// ===== Connection-level helpers (shared with bootstrap) =====

pub(crate) fn insert_record(
    conn: &Connection,
    module_id: &str,
    fields: &[Field],
    submission: &Submission,
    policy: WritePolicy,
) -> Result<Record, ForgeError> {
    reject_unknown_keys(fields, submission)?;

    if policy == WritePolicy::Validated {
        for field in fields.iter().filter(|f| f.is_required) {
            let supplied = submission
                .get(&field.field_key)
                .or(field.default_value.as_ref());
            if supplied.is_none_or(json_is_empty) {
                return Err(ForgeError::RequiredFieldMissing(field.field_key.clone()));
            }
        }
    }

    let mut values = ValueMap::new();
    for field in fields {
        let value = match submission.get(&field.field_key) {
            Some(raw) => field.field_type.coerce(raw),
            None => field.seed_value(),
        };
        values.insert(field.field_key.clone(), value);
    }

    let ts = time::now_epoch_z();
    let record = Record {
        id: time::new_id(),
        module_id: module_id.to_string(),
        values,
        created_at: ts.clone(),
        updated_at: ts,
    };
    conn.execute(
        "INSERT INTO records(id, module_id, data, created_at, updated_at) VALUES(?1, ?2, ?3, ?4, ?5)",
        params![
            record.id,
            record.module_id,
            serde_json::to_string(&record.values)?,
            record.created_at,
            record.updated_at,
        ],
    )?;

    for field in fields.iter().filter(|f| f.is_unique) {
        // the type's empty seed is not a submitted value and never claims
        let submitted = submission.get(&field.field_key).is_some_and(|v| !v.is_null());
        if !submitted && !field.has_explicit_default() {
            continue;
        }
        let Some(value_key) = record.values.get(&field.field_key).and_then(FieldValue::unique_key)
        else {
            continue;
        };
        let claimed =
            schema::claim_unique_value(conn, module_id, &field.field_key, &value_key, &record.id);
        match (claimed, policy) {
            (Ok(()), _) => {}
            (Err(ForgeError::UniqueConstraintViolation(key)), WritePolicy::Backfill) => {
                tracing::warn!(record_id = %record.id, key, "legacy value collides on unique field; left unindexed");
            }
            (Err(e), _) => return Err(e),
        }
    }

    tracing::info!(record_id = %record.id, module_id, "record created");
    Ok(record)
}

fn reject_unknown_keys(fields: &[Field], submission: &Submission) -> Result<(), ForgeError> {
    for key in submission.keys() {
        if !fields.iter().any(|f| &f.field_key == key) {
            return Err(ForgeError::UnknownField(key.clone()));
        }
    }
    Ok(())
}

struct RecordRow {
    id: String,
    module_id: String,
    data: JsonMap<String, JsonValue>,
    created_at: String,
    updated_at: String,
}

fn record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn parse_row(raw: (String, String, String, String, String)) -> Result<RecordRow, ForgeError> {
    let (id, module_id, data, created_at, updated_at) = raw;
    Ok(RecordRow {
        id,
        module_id,
        data: serde_json::from_str(&data)?,
        created_at,
        updated_at,
    })
}

fn require_record_row(
    conn: &Connection,
    scope: &AccountScope,
    record_id: &str,
) -> Result<RecordRow, ForgeError> {
    let raw = conn
        .query_row(
            "SELECT r.id, r.module_id, r.data, r.created_at, r.updated_at
             FROM records r JOIN modules m ON m.id = r.module_id
             WHERE r.id = ?1 AND m.account_id = ?2 AND m.state = 'ready'",
            params![record_id, scope.account_id()],
            record_row,
        )
        .optional()?
        .ok_or_else(|| ForgeError::RecordNotFound(record_id.to_string()))?;
    parse_row(raw)
}

fn record_rows_for_module(conn: &Connection, module_id: &str) -> Result<Vec<RecordRow>, ForgeError> {
    let mut stmt = conn.prepare(
        "SELECT id, module_id, data, created_at, updated_at FROM records
         WHERE module_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![module_id], record_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(parse_row(r?)?);
    }
    Ok(out)
}

/// Read stored JSON through the fields' current types.
fn interpret(fields: &[Field], row: RecordRow) -> Record {
    let values = row
        .data
        .iter()
        .map(|(key, stored)| {
            let field_type = fields
                .iter()
                .find(|f| &f.field_key == key)
                .map(|f| f.field_type);
            (key.clone(), FieldValue::from_stored(field_type, stored))
        })
        .collect();
    Record {
        id: row.id,
        module_id: row.module_id,
        values,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}
