//! Typed record values.
//!
//! A record's value map is persisted as a JSON object. On the way in, values
//! are coerced by the field's type; on the way out they are reinterpreted with
//! the field's *current* type. Stored JSON that does not fit the current type
//! (a text value under a field since retyped to `number`, or a key whose field
//! was deleted) comes back as `Raw` rather than being converted or dropped.

use crate::engine::field_types::{FieldType, ValueShape};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
    /// Stored JSON that does not match the field's current type.
    Raw(JsonValue),
}

pub type ValueMap = BTreeMap<String, FieldValue>;

impl FieldValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Empty => JsonValue::Null,
            FieldValue::Text(s) => JsonValue::String(s.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Bool(b) => JsonValue::Bool(*b),
            FieldValue::List(items) => {
                JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect())
            }
            FieldValue::Raw(v) => v.clone(),
        }
    }

    /// Interpret a stored JSON value. `None` means no current field has this key.
    pub fn from_stored(field_type: Option<FieldType>, stored: &JsonValue) -> FieldValue {
        if stored.is_null() {
            return FieldValue::Empty;
        }
        let Some(field_type) = field_type else {
            return FieldValue::Raw(stored.clone());
        };
        match (field_type.shape(), stored) {
            (ValueShape::Text, JsonValue::String(s)) => FieldValue::Text(s.clone()),
            (ValueShape::Number, JsonValue::Number(n)) => match n.as_f64() {
                Some(f) => FieldValue::Number(f),
                None => FieldValue::Raw(stored.clone()),
            },
            (ValueShape::Bool, JsonValue::Bool(b)) => FieldValue::Bool(*b),
            (ValueShape::List, JsonValue::Array(items))
                if items.iter().all(JsonValue::is_string) =>
            {
                FieldValue::List(
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                )
            }
            _ => FieldValue::Raw(stored.clone()),
        }
    }

    /// Required-field emptiness: nothing, blank text, or an empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Raw(v) => json_is_empty(v),
            FieldValue::Number(_) | FieldValue::Bool(_) => false,
        }
    }

    /// Canonical key used by the uniqueness index. Case-sensitive; `None` for
    /// empty values, which never collide.
    pub fn unique_key(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(match self {
            FieldValue::Text(s) => format!("s:{}", s),
            // -0.0 == 0.0, so both share one key
            FieldValue::Number(n) => format!("n:{}", if *n == 0.0 { 0.0 } else { *n }),
            FieldValue::Bool(b) => format!("b:{}", b),
            other => format!("j:{}", other.to_json()),
        })
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Plain text used for display and filtering.
    pub fn display_text(&self) -> String {
        match self {
            FieldValue::Empty => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::List(items) => items.join(", "),
            FieldValue::Raw(JsonValue::String(s)) => s.clone(),
            FieldValue::Raw(v) => v.to_string(),
        }
    }
}

/// Emptiness of a raw submitted value, before coercion.
pub fn json_is_empty(v: &JsonValue) -> bool {
    match v {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::Bool(_) | JsonValue::Number(_) => false,
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

pub fn value_map_to_json(values: &ValueMap) -> JsonValue {
    JsonValue::Object(
        values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}
