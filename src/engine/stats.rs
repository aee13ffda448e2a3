//! Dashboard aggregates, derived entirely from `list_records`.

use crate::core::error::ForgeError;
use crate::core::store::{AccountScope, Store};
use crate::engine::field_types::FieldType;
use crate::engine::records::{self, Record};
use crate::engine::schema::{self, Field};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModuleStats {
    pub module_id: String,
    pub total: u64,
    /// Record count per value of the configured status field. Records with no
    /// status are counted under `""`.
    pub by_status: BTreeMap<String, u64>,
    /// Sum per currency field. Values that do not read back as numbers are skipped.
    pub currency_totals: BTreeMap<String, f64>,
}

pub fn get_stats(store: &Store, scope: &AccountScope, module_id: &str) -> Result<ModuleStats, ForgeError> {
    let fields = schema::list_fields(store, scope, module_id)?;
    let records = records::list_records(store, scope, module_id, None)?;
    Ok(aggregate(
        module_id,
        &fields,
        &records,
        &store.config.dashboard.status_field,
    ))
}

fn aggregate(module_id: &str, fields: &[Field], records: &[Record], status_field: &str) -> ModuleStats {
    let has_status = fields.iter().any(|f| f.field_key == status_field);
    let currency: Vec<&str> = fields
        .iter()
        .filter(|f| f.field_type == FieldType::Currency)
        .map(|f| f.field_key.as_str())
        .collect();

    let mut by_status = BTreeMap::new();
    let mut currency_totals: BTreeMap<String, f64> =
        currency.iter().map(|k| (k.to_string(), 0.0)).collect();

    for record in records {
        if has_status {
            let status = record
                .value(status_field)
                .map(|v| v.display_text())
                .unwrap_or_default();
            *by_status.entry(status).or_insert(0) += 1;
        }
        for key in &currency {
            if let Some(n) = record.value(key).and_then(|v| v.as_number()) {
                if let Some(total) = currency_totals.get_mut(*key) {
                    *total += n;
                }
            }
        }
    }

    ModuleStats {
        module_id: module_id.to_string(),
        total: records.len() as u64,
        by_status,
        currency_totals,
    }
}
