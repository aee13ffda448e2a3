use crate::core::error::ForgeError;
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn db_connect(db_path: &str, busy_timeout_secs: u64) -> Result<Connection, ForgeError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(busy_timeout_secs))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn engine_db_path(root: &Path, database: &str) -> PathBuf {
    root.join(database)
}

/// Bring the engine tables up to `SCHEMA_VERSION`. Cheap when already current.
pub fn ensure_schema(conn: &Connection) -> Result<(), ForgeError> {
    conn.execute(schemas::DB_SCHEMA_META, [])?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let current_version: u32 = current
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    if current_version >= schemas::SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute(schemas::DB_SCHEMA_MODULES, [])?;
    conn.execute(schemas::DB_SCHEMA_FIELDS, [])?;
    conn.execute(schemas::DB_SCHEMA_INDEX_FIELDS_ORDER, [])?;
    conn.execute(schemas::DB_SCHEMA_RECORDS, [])?;
    conn.execute(schemas::DB_SCHEMA_INDEX_RECORDS_MODULE, [])?;
    conn.execute(schemas::DB_SCHEMA_LEGACY_CLIENTS, [])?;
    conn.execute(schemas::DB_SCHEMA_INDEX_LEGACY_ACCOUNT, [])?;

    if current_version < 2 {
        // v1 databases predate bootstrap provisioning state
        let _ = conn.execute(
            "ALTER TABLE modules ADD COLUMN state TEXT NOT NULL DEFAULT 'ready'",
            [],
        );
    }

    if current_version < 3 {
        conn.execute(schemas::DB_SCHEMA_RECORD_UNIQUE_VALUES, [])?;
        conn.execute(schemas::DB_SCHEMA_INDEX_UNIQUE_RECORD, [])?;
    }

    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [schemas::SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<u32, ForgeError> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(v.and_then(|s| s.parse().ok()).unwrap_or(0))
}
