//! Module/field/record engine built on the core store.

pub mod bootstrap;
pub mod designer;
pub mod field_types;
pub mod records;
pub mod schema;
pub mod stats;
pub mod values;
