//! The closed set of field types and what each one means for stored values.
//!
//! Every type answers three questions: what empty value seeds a new record,
//! whether it carries a choice list, and how a raw submitted value is coerced.
//! Coercion is deliberately lenient: a value that does not parse becomes the
//! type's empty value instead of failing the write.

use crate::core::error::ForgeError;
use crate::engine::values::FieldValue;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Longtext,
    Number,
    Percentage,
    Currency,
    Checkbox,
    Url,
    Email,
    Phone,
    Date,
    Datetime,
    Select,
    Multiselect,
    File,
    Image,
}

/// Storage shape of a type's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Text,
    Number,
    Bool,
    List,
}

impl FieldType {
    pub const ALL: [FieldType; 15] = [
        FieldType::Text,
        FieldType::Longtext,
        FieldType::Number,
        FieldType::Percentage,
        FieldType::Currency,
        FieldType::Checkbox,
        FieldType::Url,
        FieldType::Email,
        FieldType::Phone,
        FieldType::Date,
        FieldType::Datetime,
        FieldType::Select,
        FieldType::Multiselect,
        FieldType::File,
        FieldType::Image,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Longtext => "longtext",
            FieldType::Number => "number",
            FieldType::Percentage => "percentage",
            FieldType::Currency => "currency",
            FieldType::Checkbox => "checkbox",
            FieldType::Url => "url",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Select => "select",
            FieldType::Multiselect => "multiselect",
            FieldType::File => "file",
            FieldType::Image => "image",
        }
    }

    /// Label a freshly dropped field starts with.
    pub fn default_label(self) -> &'static str {
        match self {
            FieldType::Text => "Text",
            FieldType::Longtext => "Long Text",
            FieldType::Number => "Number",
            FieldType::Percentage => "Percentage",
            FieldType::Currency => "Currency",
            FieldType::Checkbox => "Checkbox",
            FieldType::Url => "URL",
            FieldType::Email => "Email",
            FieldType::Phone => "Phone",
            FieldType::Date => "Date",
            FieldType::Datetime => "Date & Time",
            FieldType::Select => "Select",
            FieldType::Multiselect => "Multi Select",
            FieldType::File => "File",
            FieldType::Image => "Image",
        }
    }

    pub fn shape(self) -> ValueShape {
        match self {
            FieldType::Number | FieldType::Percentage | FieldType::Currency => ValueShape::Number,
            FieldType::Checkbox => ValueShape::Bool,
            FieldType::Multiselect => ValueShape::List,
            _ => ValueShape::Text,
        }
    }

    pub fn supports_options(self) -> bool {
        matches!(self, FieldType::Select | FieldType::Multiselect)
    }

    pub fn is_numeric(self) -> bool {
        self.shape() == ValueShape::Number
    }

    /// Value seeded into a new record when the field has no explicit default.
    pub fn empty_value(self) -> FieldValue {
        match self.shape() {
            ValueShape::Text => FieldValue::Text(String::new()),
            ValueShape::Number => FieldValue::Number(0.0),
            ValueShape::Bool => FieldValue::Bool(false),
            ValueShape::List => FieldValue::List(Vec::new()),
        }
    }

    /// Coerce a submitted raw value. Never fails; unusable input becomes
    /// `empty_value()`.
    pub fn coerce(self, raw: &JsonValue) -> FieldValue {
        if raw.is_null() {
            return self.empty_value();
        }
        match self.shape() {
            ValueShape::Number => coerce_number(raw)
                .map(FieldValue::Number)
                .unwrap_or_else(|| {
                    tracing::warn!(field_type = self.as_str(), value = %raw, "number coercion fell back to 0");
                    self.empty_value()
                }),
            ValueShape::Bool => FieldValue::Bool(coerce_bool(raw)),
            ValueShape::List => FieldValue::List(coerce_list(raw)),
            ValueShape::Text => FieldValue::Text(coerce_text(raw)),
        }
    }
}

fn coerce_number(raw: &JsonValue) -> Option<f64> {
    match raw {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite()),
        _ => None,
    }
}

fn coerce_bool(raw: &JsonValue) -> bool {
    match raw {
        JsonValue::Bool(b) => *b,
        JsonValue::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn coerce_list(raw: &JsonValue) -> Vec<String> {
    match raw {
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                JsonValue::String(s) => Some(s.clone()),
                JsonValue::Number(n) => Some(n.to_string()),
                JsonValue::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        // comma-joined text from plain form inputs
        JsonValue::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn coerce_text(raw: &JsonValue) -> String {
    match raw {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ForgeError::UnsupportedFieldType(s.to_string()))
    }
}
