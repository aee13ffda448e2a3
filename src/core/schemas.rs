//! Centralized database schema definitions for the record engine.
//!
//! Everything lives in one SQLite file so that module bootstrap can create a
//! module, its fields and its backfilled records inside a single transaction.

pub const SCHEMA_VERSION: u32 = 3;

pub const DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const DB_SCHEMA_MODULES: &str = "
    CREATE TABLE IF NOT EXISTS modules (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        name TEXT NOT NULL,
        state TEXT NOT NULL DEFAULT 'ready', -- ready, provisioning
        created_at TEXT NOT NULL,
        UNIQUE(account_id, name)
    )
";

pub const DB_SCHEMA_FIELDS: &str = "
    CREATE TABLE IF NOT EXISTS fields (
        id TEXT PRIMARY KEY,
        module_id TEXT NOT NULL,
        field_key TEXT NOT NULL,
        label TEXT NOT NULL,
        field_type TEXT NOT NULL,
        placeholder TEXT NOT NULL DEFAULT '',
        help_text TEXT NOT NULL DEFAULT '',
        is_required INTEGER NOT NULL DEFAULT 0,
        is_unique INTEGER NOT NULL DEFAULT 0,
        default_value TEXT, -- JSON
        options TEXT NOT NULL DEFAULT '{}', -- JSON blob
        display_order INTEGER NOT NULL,
        column_span INTEGER NOT NULL DEFAULT 1,
        is_system INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(module_id, field_key),
        FOREIGN KEY(module_id) REFERENCES modules(id)
    )
";

pub const DB_SCHEMA_INDEX_FIELDS_ORDER: &str =
    "CREATE INDEX IF NOT EXISTS idx_fields_module_order ON fields(module_id, display_order, id)";

pub const DB_SCHEMA_RECORDS: &str = "
    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY,
        module_id TEXT NOT NULL,
        data TEXT NOT NULL DEFAULT '{}', -- JSON value map keyed by field_key
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(module_id) REFERENCES modules(id)
    )
";

pub const DB_SCHEMA_INDEX_RECORDS_MODULE: &str =
    "CREATE INDEX IF NOT EXISTS idx_records_module ON records(module_id, created_at, id)";

/// Backing constraint for `is_unique` fields: one row per (module, key, value).
pub const DB_SCHEMA_RECORD_UNIQUE_VALUES: &str = "
    CREATE TABLE IF NOT EXISTS record_unique_values (
        module_id TEXT NOT NULL,
        field_key TEXT NOT NULL,
        value_key TEXT NOT NULL,
        record_id TEXT NOT NULL,
        PRIMARY KEY(module_id, field_key, value_key),
        FOREIGN KEY(record_id) REFERENCES records(id) ON DELETE CASCADE
    )
";

pub const DB_SCHEMA_INDEX_UNIQUE_RECORD: &str =
    "CREATE INDEX IF NOT EXISTS idx_unique_values_record ON record_unique_values(record_id)";

/// The hard-coded client table that predates runtime modules.
pub const DB_SCHEMA_LEGACY_CLIENTS: &str = "
    CREATE TABLE IF NOT EXISTS legacy_clients (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        company TEXT,
        status TEXT,
        contract_value REAL,
        website TEXT,
        notes TEXT,
        created_at TEXT NOT NULL
    )
";

pub const DB_SCHEMA_INDEX_LEGACY_ACCOUNT: &str =
    "CREATE INDEX IF NOT EXISTS idx_legacy_clients_account ON legacy_clients(account_id)";
