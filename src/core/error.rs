use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: an authenticated account is required")]
    Unauthorized,
    #[error("Module not found: {0}")]
    ModuleNotFound(String),
    #[error("Module name already in use: {0}")]
    ModuleNameTaken(String),
    #[error("Field not found: {0}")]
    FieldNotFound(String),
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("System field cannot be deleted or have key/required/unique changed: {0}")]
    SystemFieldImmutable(String),
    #[error("Field key is immutable after creation: {0}")]
    FieldKeyImmutable(String),
    #[error("Field key already exists in module: {0}")]
    DuplicateFieldKey(String),
    #[error("Unknown field key for module: {0}")]
    UnknownField(String),
    #[error("Reorder set must be a permutation of the module's fields: {0}")]
    InvalidReorderSet(String),
    #[error("Required field missing: {0}")]
    RequiredFieldMissing(String),
    #[error("Unique constraint violated on field: {0}")]
    UniqueConstraintViolation(String),
    #[error("Unsupported field type: {0}")]
    UnsupportedFieldType(String),
}

impl ForgeError {
    /// Stable machine-readable code for envelopes and audit lines.
    pub fn code(&self) -> &'static str {
        match self {
            ForgeError::Rusqlite(_) => "sqlite",
            ForgeError::Io(_) => "io",
            ForgeError::Json(_) => "json",
            ForgeError::Config(_) => "config",
            ForgeError::Validation(_) => "validation",
            ForgeError::Unauthorized => "unauthorized",
            ForgeError::ModuleNotFound(_) => "module_not_found",
            ForgeError::ModuleNameTaken(_) => "module_name_taken",
            ForgeError::FieldNotFound(_) => "field_not_found",
            ForgeError::RecordNotFound(_) => "record_not_found",
            ForgeError::SystemFieldImmutable(_) => "system_field_immutable",
            ForgeError::FieldKeyImmutable(_) => "field_key_immutable",
            ForgeError::DuplicateFieldKey(_) => "duplicate_field_key",
            ForgeError::UnknownField(_) => "unknown_field",
            ForgeError::InvalidReorderSet(_) => "invalid_reorder_set",
            ForgeError::RequiredFieldMissing(_) => "required_field_missing",
            ForgeError::UniqueConstraintViolation(_) => "unique_constraint_violation",
            ForgeError::UnsupportedFieldType(_) => "unsupported_field_type",
        }
    }
}
