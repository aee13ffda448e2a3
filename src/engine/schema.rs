//! Schema store: modules and their ordered, typed fields.
//!
//! Display order is kept dense (`0..n`) by every mutation: create appends,
//! delete compacts, reorder rewrites the whole sequence. All three run inside
//! the broker's IMMEDIATE transaction, so they cannot interleave on a module.

use crate::core::broker::DbBroker;
use crate::core::error::ForgeError;
use crate::core::store::{AccountScope, Store};
use crate::core::time;
use crate::engine::field_types::FieldType;
use crate::engine::values::FieldValue;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

pub const MODULE_STATE_READY: &str = "ready";
pub const MODULE_STATE_PROVISIONING: &str = "provisioning";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Module {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FieldOptions {
    /// Choice list; select/multiselect only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub id: String,
    pub module_id: String,
    pub field_key: String,
    pub label: String,
    pub field_type: FieldType,
    pub placeholder: String,
    pub help_text: String,
    pub is_required: bool,
    pub is_unique: bool,
    pub default_value: Option<JsonValue>,
    pub options: FieldOptions,
    pub display_order: u32,
    pub column_span: u8,
    pub is_system: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Field {
    /// The value a new record gets before the submission is overlaid.
    pub fn seed_value(&self) -> FieldValue {
        match &self.default_value {
            Some(v) if !v.is_null() => self.field_type.coerce(v),
            _ => self.field_type.empty_value(),
        }
    }

    pub fn has_explicit_default(&self) -> bool {
        self.default_value.as_ref().is_some_and(|v| !v.is_null())
    }
}

/// Input for `create_field`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSpec {
    /// Explicit key; generated as `field_<millis>` when absent.
    pub field_key: Option<String>,
    pub label: String,
    pub field_type: FieldType,
    pub placeholder: String,
    pub help_text: String,
    pub is_required: bool,
    pub is_unique: bool,
    pub default_value: Option<JsonValue>,
    pub options: FieldOptions,
    pub column_span: u8,
    pub is_system: bool,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self::of_type(FieldType::Text)
    }
}

impl FieldSpec {
    /// Palette defaults for a type.
    pub fn of_type(field_type: FieldType) -> Self {
        Self {
            field_key: None,
            label: field_type.default_label().to_string(),
            field_type,
            placeholder: String::new(),
            help_text: String::new(),
            is_required: false,
            is_unique: false,
            default_value: None,
            options: FieldOptions::default(),
            column_span: 1,
            is_system: false,
        }
    }

    pub fn keyed(mut self, key: &str) -> Self {
        self.field_key = Some(key.to_string());
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    pub fn span(mut self, span: u8) -> Self {
        self.column_span = span;
        self
    }

    pub fn choices(mut self, choices: &[&str]) -> Self {
        self.options.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn default_value(mut self, value: JsonValue) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Partial update for `update_field`. `None` leaves the property untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPatch {
    /// Present only so a key change can be rejected explicitly.
    pub field_key: Option<String>,
    pub label: Option<String>,
    pub field_type: Option<FieldType>,
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    pub is_required: Option<bool>,
    pub is_unique: Option<bool>,
    /// `Some(None)` clears the default.
    pub default_value: Option<Option<JsonValue>>,
    pub options: Option<FieldOptions>,
    pub column_span: Option<u8>,
}

// ===== Modules =====

pub fn create_module(store: &Store, scope: &AccountScope, name: &str) -> Result<Module, ForgeError> {
    let name = normalize_module_name(name)?;
    let broker = DbBroker::new(store);
    broker.with_write(scope, "module.create", |conn| {
        insert_module(conn, scope, &name, MODULE_STATE_READY)
    })
}

pub fn list_modules(store: &Store, scope: &AccountScope) -> Result<Vec<Module>, ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_read(scope, "module.list", |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at FROM modules
             WHERE account_id = ?1 AND state = 'ready'
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![scope.account_id()], module_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

pub fn get_module(store: &Store, scope: &AccountScope, module_id: &str) -> Result<Module, ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_read(scope, "module.get", |conn| require_module(conn, scope, module_id))
}

pub fn find_module_by_name(
    store: &Store,
    scope: &AccountScope,
    name: &str,
) -> Result<Option<Module>, ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_read(scope, "module.find", |conn| {
        module_by_name(conn, scope, name.trim(), MODULE_STATE_READY)
    })
}

fn normalize_module_name(name: &str) -> Result<String, ForgeError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ForgeError::Validation("module name must not be blank".to_string()));
    }
    Ok(trimmed.to_string())
}

fn module_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Module> {
    Ok(Module {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

pub(crate) fn insert_module(
    conn: &Connection,
    scope: &AccountScope,
    name: &str,
    state: &str,
) -> Result<Module, ForgeError> {
    let taken: bool = conn
        .query_row(
            "SELECT 1 FROM modules WHERE account_id = ?1 AND name = ?2",
            params![scope.account_id(), name],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    if taken {
        return Err(ForgeError::ModuleNameTaken(name.to_string()));
    }

    let module = Module {
        id: time::new_id(),
        name: name.to_string(),
        created_at: time::now_epoch_z(),
    };
    conn.execute(
        "INSERT INTO modules(id, account_id, name, state, created_at) VALUES(?1, ?2, ?3, ?4, ?5)",
        params![module.id, scope.account_id(), module.name, state, module.created_at],
    )?;
    tracing::info!(module_id = %module.id, name = %module.name, state, "module created");
    Ok(module)
}

pub(crate) fn module_by_name(
    conn: &Connection,
    scope: &AccountScope,
    name: &str,
    state: &str,
) -> Result<Option<Module>, ForgeError> {
    Ok(conn
        .query_row(
            "SELECT id, name, created_at FROM modules
             WHERE account_id = ?1 AND name = ?2 AND state = ?3",
            params![scope.account_id(), name, state],
            module_from_row,
        )
        .optional()?)
}

/// Resolve a visible module of the account or fail with `ModuleNotFound`.
pub(crate) fn require_module(
    conn: &Connection,
    scope: &AccountScope,
    module_id: &str,
) -> Result<Module, ForgeError> {
    conn.query_row(
        "SELECT id, name, created_at FROM modules
         WHERE id = ?1 AND account_id = ?2 AND state = 'ready'",
        params![module_id, scope.account_id()],
        module_from_row,
    )
    .optional()?
    .ok_or_else(|| ForgeError::ModuleNotFound(module_id.to_string()))
}

// ===== Fields =====

const FIELD_COLUMNS: &str = "f.id, f.module_id, f.field_key, f.label, f.field_type, f.placeholder,
     f.help_text, f.is_required, f.is_unique, f.default_value, f.options, f.display_order,
     f.column_span, f.is_system, f.created_at, f.updated_at";

/// Row as stored; turned into a `Field` once the JSON/enum columns parse.
struct FieldRow {
    id: String,
    module_id: String,
    field_key: String,
    label: String,
    field_type: String,
    placeholder: String,
    help_text: String,
    is_required: bool,
    is_unique: bool,
    default_value: Option<String>,
    options: String,
    display_order: i64,
    column_span: i64,
    is_system: bool,
    created_at: String,
    updated_at: String,
}

fn field_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FieldRow> {
    Ok(FieldRow {
        id: row.get(0)?,
        module_id: row.get(1)?,
        field_key: row.get(2)?,
        label: row.get(3)?,
        field_type: row.get(4)?,
        placeholder: row.get(5)?,
        help_text: row.get(6)?,
        is_required: row.get(7)?,
        is_unique: row.get(8)?,
        default_value: row.get(9)?,
        options: row.get(10)?,
        display_order: row.get(11)?,
        column_span: row.get(12)?,
        is_system: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl FieldRow {
    fn into_field(self) -> Result<Field, ForgeError> {
        let default_value = match self.default_value.as_deref() {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        };
        Ok(Field {
            id: self.id,
            module_id: self.module_id,
            field_key: self.field_key,
            label: self.label,
            field_type: self.field_type.parse()?,
            placeholder: self.placeholder,
            help_text: self.help_text,
            is_required: self.is_required,
            is_unique: self.is_unique,
            default_value,
            options: serde_json::from_str(&self.options)?,
            display_order: u32::try_from(self.display_order).unwrap_or(u32::MAX),
            column_span: u8::try_from(self.column_span).unwrap_or(1),
            is_system: self.is_system,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub fn create_field(
    store: &Store,
    scope: &AccountScope,
    module_id: &str,
    spec: FieldSpec,
) -> Result<Field, ForgeError> {
    validate_spec(&spec)?;
    let broker = DbBroker::new(store);
    broker.with_write(scope, "field.create", |conn| {
        require_module(conn, scope, module_id)?;
        insert_field(conn, module_id, &spec)
    })
}

pub fn get_field(store: &Store, scope: &AccountScope, field_id: &str) -> Result<Field, ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_read(scope, "field.get", |conn| require_field(conn, scope, field_id))
}

/// Fields ordered by `display_order`, ties broken by id.
pub fn list_fields(
    store: &Store,
    scope: &AccountScope,
    module_id: &str,
) -> Result<Vec<Field>, ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_read(scope, "field.list", |conn| {
        require_module(conn, scope, module_id)?;
        fields_for_module(conn, module_id)
    })
}

pub fn update_field(
    store: &Store,
    scope: &AccountScope,
    field_id: &str,
    patch: FieldPatch,
) -> Result<Field, ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_write(scope, "field.update", |conn| {
        let current = require_field(conn, scope, field_id)?;
        let next = apply_patch(&current, &patch)?;

        conn.execute(
            "UPDATE fields SET label = ?1, field_type = ?2, placeholder = ?3, help_text = ?4,
                 is_required = ?5, is_unique = ?6, default_value = ?7, options = ?8,
                 column_span = ?9, updated_at = ?10
             WHERE id = ?11",
            params![
                next.label,
                next.field_type.as_str(),
                next.placeholder,
                next.help_text,
                next.is_required,
                next.is_unique,
                next.default_value.as_ref().map(JsonValue::to_string),
                serde_json::to_string(&next.options)?,
                next.column_span,
                next.updated_at,
                next.id,
            ],
        )?;

        let retyped = next.field_type != current.field_type;
        if current.is_unique && (!next.is_unique || retyped) {
            clear_unique_index(conn, &next.module_id, &next.field_key)?;
        }
        if next.is_unique && (!current.is_unique || retyped) {
            backfill_unique_index(conn, &next)?;
        }

        tracing::info!(field_id = %next.id, key = %next.field_key, "field updated");
        Ok(next)
    })
}

pub fn delete_field(store: &Store, scope: &AccountScope, field_id: &str) -> Result<(), ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_write(scope, "field.delete", |conn| {
        let field = require_field(conn, scope, field_id)?;
        if field.is_system {
            return Err(ForgeError::SystemFieldImmutable(field.field_key));
        }

        conn.execute("DELETE FROM fields WHERE id = ?1", params![field.id])?;
        clear_unique_index(conn, &field.module_id, &field.field_key)?;

        let remaining = fields_for_module(conn, &field.module_id)?;
        let ids: Vec<&str> = remaining.iter().map(|f| f.id.as_str()).collect();
        write_order(conn, &ids)?;

        tracing::info!(field_id = %field.id, key = %field.field_key, "field deleted, order compacted");
        Ok(())
    })
}

/// Replace the module's whole field order. `ordered_ids` must be a permutation
/// of the current field ids; otherwise nothing is written.
pub fn reorder_fields(
    store: &Store,
    scope: &AccountScope,
    module_id: &str,
    ordered_ids: &[String],
) -> Result<Vec<Field>, ForgeError> {
    let broker = DbBroker::new(store);
    broker.with_write(scope, "field.reorder", |conn| {
        require_module(conn, scope, module_id)?;
        let current = fields_for_module(conn, module_id)?;
        check_permutation(&current, ordered_ids)?;

        let ids: Vec<&str> = ordered_ids.iter().map(String::as_str).collect();
        write_order(conn, &ids)?;
        tracing::info!(module_id, count = ids.len(), "fields reordered");
        fields_for_module(conn, module_id)
    })
}

fn check_permutation(current: &[Field], ordered_ids: &[String]) -> Result<(), ForgeError> {
    if ordered_ids.len() != current.len() {
        return Err(ForgeError::InvalidReorderSet(format!(
            "expected {} field ids, got {}",
            current.len(),
            ordered_ids.len()
        )));
    }
    let known: FxHashSet<&str> = current.iter().map(|f| f.id.as_str()).collect();
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for id in ordered_ids {
        if !known.contains(id.as_str()) {
            return Err(ForgeError::InvalidReorderSet(format!("unknown field id '{}'", id)));
        }
        if !seen.insert(id.as_str()) {
            return Err(ForgeError::InvalidReorderSet(format!("duplicate field id '{}'", id)));
        }
    }
    Ok(())
}

/// Set `display_order = index` for each id, skipping rows already in place.
fn write_order(conn: &Connection, ids: &[&str]) -> Result<(), ForgeError> {
    let ts = time::now_epoch_z();
    let mut stmt = conn.prepare(
        "UPDATE fields SET display_order = ?1, updated_at = ?2
         WHERE id = ?3 AND display_order != ?1",
    )?;
    for (idx, id) in ids.iter().enumerate() {
        stmt.execute(params![idx as i64, ts, id])?;
    }
    Ok(())
}

pub(crate) fn fields_for_module(conn: &Connection, module_id: &str) -> Result<Vec<Field>, ForgeError> {
    let sql = format!(
        "SELECT {} FROM fields f WHERE f.module_id = ?1 ORDER BY f.display_order ASC, f.id ASC",
        FIELD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![module_id], field_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?.into_field()?);
    }
    Ok(out)
}

pub(crate) fn require_field(
    conn: &Connection,
    scope: &AccountScope,
    field_id: &str,
) -> Result<Field, ForgeError> {
    let sql = format!(
        "SELECT {} FROM fields f JOIN modules m ON m.id = f.module_id
         WHERE f.id = ?1 AND m.account_id = ?2 AND m.state = 'ready'",
        FIELD_COLUMNS
    );
    conn.query_row(&sql, params![field_id, scope.account_id()], field_row)
        .optional()?
        .ok_or_else(|| ForgeError::FieldNotFound(field_id.to_string()))?
        .into_field()
}

fn field_by_key(conn: &Connection, module_id: &str, key: &str) -> Result<Option<Field>, ForgeError> {
    let sql = format!(
        "SELECT {} FROM fields f WHERE f.module_id = ?1 AND f.field_key = ?2",
        FIELD_COLUMNS
    );
    conn.query_row(&sql, params![module_id, key], field_row)
        .optional()?
        .map(FieldRow::into_field)
        .transpose()
}

/// Append a field to the module. The caller has already resolved the module.
pub(crate) fn insert_field(
    conn: &Connection,
    module_id: &str,
    spec: &FieldSpec,
) -> Result<Field, ForgeError> {
    let field_key = match spec.field_key.as_deref() {
        Some(key) => {
            if let Some(existing) = field_by_key(conn, module_id, key)? {
                // replayed create from a retried request
                if existing.field_type == spec.field_type {
                    tracing::debug!(key, "field create replayed");
                    return Ok(existing);
                }
                return Err(ForgeError::DuplicateFieldKey(key.to_string()));
            }
            key.to_string()
        }
        None => generate_field_key(conn, module_id)?,
    };

    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM fields WHERE module_id = ?1",
        params![module_id],
        |row| row.get(0),
    )?;

    let ts = time::now_epoch_z();
    let field = Field {
        id: time::new_id(),
        module_id: module_id.to_string(),
        field_key,
        label: resolve_label(&spec.label, spec.field_type),
        field_type: spec.field_type,
        placeholder: spec.placeholder.clone(),
        help_text: spec.help_text.clone(),
        is_required: spec.is_required,
        is_unique: spec.is_unique,
        default_value: spec.default_value.clone(),
        options: spec.options.clone(),
        display_order: u32::try_from(count).unwrap_or(u32::MAX),
        column_span: spec.column_span,
        is_system: spec.is_system,
        created_at: ts.clone(),
        updated_at: ts,
    };

    conn.execute(
        "INSERT INTO fields(id, module_id, field_key, label, field_type, placeholder, help_text,
             is_required, is_unique, default_value, options, display_order, column_span,
             is_system, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            field.id,
            field.module_id,
            field.field_key,
            field.label,
            field.field_type.as_str(),
            field.placeholder,
            field.help_text,
            field.is_required,
            field.is_unique,
            field.default_value.as_ref().map(JsonValue::to_string),
            serde_json::to_string(&field.options)?,
            field.display_order,
            field.column_span,
            field.is_system,
            field.created_at,
            field.updated_at,
        ],
    )?;

    if field.is_unique {
        backfill_unique_index(conn, &field)?;
    }

    tracing::info!(
        field_id = %field.id,
        key = %field.field_key,
        field_type = %field.field_type,
        order = field.display_order,
        "field created"
    );
    Ok(field)
}

/// `field_<unix millis>`, bumped until no field of the module uses it.
fn generate_field_key(conn: &Connection, module_id: &str) -> Result<String, ForgeError> {
    let mut suffix = time::now_unix_millis();
    loop {
        let candidate = format!("field_{}", suffix);
        if field_by_key(conn, module_id, &candidate)?.is_none() {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

fn resolve_label(label: &str, field_type: FieldType) -> String {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        field_type.default_label().to_string()
    } else {
        trimmed.to_string()
    }
}

fn field_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{0,63}$").expect("static field key regex"))
}

pub fn is_valid_field_key(key: &str) -> bool {
    field_key_regex().is_match(key)
}

fn validate_spec(spec: &FieldSpec) -> Result<(), ForgeError> {
    if let Some(key) = spec.field_key.as_deref() {
        if !is_valid_field_key(key) {
            return Err(ForgeError::Validation(format!(
                "field key '{}' must be lowercase letters, digits and underscores, starting with a letter",
                key
            )));
        }
    }
    validate_column_span(spec.column_span)?;
    validate_options(spec.field_type, &spec.options)
}

fn validate_column_span(span: u8) -> Result<(), ForgeError> {
    if (1..=3).contains(&span) {
        Ok(())
    } else {
        Err(ForgeError::Validation(format!(
            "column span must be 1, 2 or 3, got {}",
            span
        )))
    }
}

fn validate_options(field_type: FieldType, options: &FieldOptions) -> Result<(), ForgeError> {
    if !options.choices.is_empty() && !field_type.supports_options() {
        return Err(ForgeError::Validation(format!(
            "field type '{}' does not take a choice list",
            field_type
        )));
    }
    if let (Some(min), Some(max)) = (options.min, options.max) {
        if min > max {
            return Err(ForgeError::Validation(format!("min {} exceeds max {}", min, max)));
        }
    }
    if let (Some(min), Some(max)) = (options.min_length, options.max_length) {
        if min > max {
            return Err(ForgeError::Validation(format!(
                "min_length {} exceeds max_length {}",
                min, max
            )));
        }
    }
    if let Some(pattern) = options.pattern.as_deref() {
        Regex::new(pattern)
            .map_err(|e| ForgeError::Validation(format!("invalid pattern '{}': {}", pattern, e)))?;
    }
    Ok(())
}

fn apply_patch(current: &Field, patch: &FieldPatch) -> Result<Field, ForgeError> {
    if let Some(key) = patch.field_key.as_deref() {
        if key != current.field_key {
            return Err(if current.is_system {
                ForgeError::SystemFieldImmutable(current.field_key.clone())
            } else {
                ForgeError::FieldKeyImmutable(current.field_key.clone())
            });
        }
    }
    if current.is_system {
        let required_changed = patch.is_required.is_some_and(|v| v != current.is_required);
        let unique_changed = patch.is_unique.is_some_and(|v| v != current.is_unique);
        let type_changed = patch.field_type.is_some_and(|t| t != current.field_type);
        if required_changed || unique_changed || type_changed {
            return Err(ForgeError::SystemFieldImmutable(current.field_key.clone()));
        }
    }

    let mut next = current.clone();
    if let Some(label) = &patch.label {
        next.label = resolve_label(label, next.field_type);
    }
    if let Some(field_type) = patch.field_type {
        next.field_type = field_type;
        // choices would no longer be valid on a non-selection type
        if !field_type.supports_options() && patch.options.is_none() {
            next.options.choices.clear();
        }
    }
    if let Some(placeholder) = &patch.placeholder {
        next.placeholder = placeholder.clone();
    }
    if let Some(help_text) = &patch.help_text {
        next.help_text = help_text.clone();
    }
    if let Some(required) = patch.is_required {
        next.is_required = required;
    }
    if let Some(unique) = patch.is_unique {
        next.is_unique = unique;
    }
    if let Some(default_value) = &patch.default_value {
        next.default_value = default_value.clone();
    }
    if let Some(options) = &patch.options {
        next.options = options.clone();
    }
    if let Some(span) = patch.column_span {
        validate_column_span(span)?;
        next.column_span = span;
    }
    validate_options(next.field_type, &next.options)?;
    next.updated_at = time::now_epoch_z();
    Ok(next)
}

// ===== Uniqueness index =====

pub(crate) fn clear_unique_index(
    conn: &Connection,
    module_id: &str,
    field_key: &str,
) -> Result<(), ForgeError> {
    conn.execute(
        "DELETE FROM record_unique_values WHERE module_id = ?1 AND field_key = ?2",
        params![module_id, field_key],
    )?;
    Ok(())
}

/// Index every stored value of a newly unique field. Fails if two records
/// already share a value.
fn backfill_unique_index(conn: &Connection, field: &Field) -> Result<(), ForgeError> {
    let mut stmt = conn.prepare("SELECT id, data FROM records WHERE module_id = ?1")?;
    let rows = stmt.query_map(params![field.module_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for r in rows {
        let (record_id, data) = r?;
        let map: serde_json::Map<String, JsonValue> = serde_json::from_str(&data)?;
        let Some(stored) = map.get(&field.field_key) else {
            continue;
        };
        let value = FieldValue::from_stored(Some(field.field_type), stored);
        // stored seeds of unsubmitted fields look like the type's empty value
        if !field.has_explicit_default() && value == field.field_type.empty_value() {
            continue;
        }
        if let Some(value_key) = value.unique_key() {
            claim_unique_value(conn, &field.module_id, &field.field_key, &value_key, &record_id)?;
        }
    }
    Ok(())
}

/// Insert one uniqueness claim; a primary-key conflict means another record
/// already holds the value.
pub(crate) fn claim_unique_value(
    conn: &Connection,
    module_id: &str,
    field_key: &str,
    value_key: &str,
    record_id: &str,
) -> Result<(), ForgeError> {
    let inserted = conn.execute(
        "INSERT INTO record_unique_values(module_id, field_key, value_key, record_id)
         VALUES(?1, ?2, ?3, ?4)
         ON CONFLICT(module_id, field_key, value_key) DO NOTHING",
        params![module_id, field_key, value_key, record_id],
    )?;
    if inserted == 0 {
        let holder: String = conn.query_row(
            "SELECT record_id FROM record_unique_values
             WHERE module_id = ?1 AND field_key = ?2 AND value_key = ?3",
            params![module_id, field_key, value_key],
            |row| row.get(0),
        )?;
        if holder != record_id {
            return Err(ForgeError::UniqueConstraintViolation(field_key.to_string()));
        }
    }
    Ok(())
}
