//! Field designer: turns drag/drop gestures on the field canvas into schema
//! store calls.
//!
//! Planning is pure (`plan`): a gesture plus the current field snapshot yields
//! a `DesignerCommand`. Only `Designer::apply` touches storage. Reorders are
//! always submitted as the complete new order, never as a delta, and a planned
//! insert carries its generated key so re-applying the same command after a
//! failure replays the create instead of adding a second field.

use crate::core::error::ForgeError;
use crate::core::store::{AccountScope, Store};
use crate::core::time;
use crate::engine::field_types::FieldType;
use crate::engine::schema::{self, Field, FieldOptions, FieldPatch, FieldSpec};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// One palette entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaletteItem {
    pub field_type: FieldType,
    pub label: &'static str,
    pub supports_options: bool,
}

pub fn palette() -> Vec<PaletteItem> {
    FieldType::ALL
        .into_iter()
        .map(|t| PaletteItem {
            field_type: t,
            label: t.default_label(),
            supports_options: t.supports_options(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragSource {
    Palette(FieldType),
    /// Index of the dragged field in the canvas.
    Canvas(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragEvent {
    pub source: DragSource,
    /// Canvas index the drag ended on; `None` when dropped outside the canvas.
    pub destination: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoopReason {
    OutsideCanvas,
    InvalidIndex,
    Unmoved,
}

#[derive(Debug, Clone)]
pub enum DesignerCommand {
    Insert { spec: FieldSpec, at: usize },
    Reorder(Vec<String>),
    Noop(NoopReason),
}

#[derive(Debug, Clone)]
pub enum DropOutcome {
    Inserted(Field),
    Reordered,
    Ignored(NoopReason),
}

/// Single-property edit from the property panel.
#[derive(Debug, Clone)]
pub enum PropertyEdit {
    Label(String),
    Placeholder(String),
    HelpText(String),
    Required(bool),
    Unique(bool),
    DefaultValue(Option<JsonValue>),
    Options(FieldOptions),
    ColumnSpan(u8),
    FieldType(FieldType),
}

impl PropertyEdit {
    fn into_patch(self) -> FieldPatch {
        let mut patch = FieldPatch::default();
        match self {
            PropertyEdit::Label(v) => patch.label = Some(v),
            PropertyEdit::Placeholder(v) => patch.placeholder = Some(v),
            PropertyEdit::HelpText(v) => patch.help_text = Some(v),
            PropertyEdit::Required(v) => patch.is_required = Some(v),
            PropertyEdit::Unique(v) => patch.is_unique = Some(v),
            PropertyEdit::DefaultValue(v) => patch.default_value = Some(v),
            PropertyEdit::Options(v) => patch.options = Some(v),
            PropertyEdit::ColumnSpan(v) => patch.column_span = Some(v),
            PropertyEdit::FieldType(v) => patch.field_type = Some(v),
        }
        patch
    }
}

/// Decide what a gesture means against the current canvas. No side effects.
pub fn plan(fields: &[Field], event: &DragEvent) -> DesignerCommand {
    let Some(to) = event.destination else {
        return DesignerCommand::Noop(NoopReason::OutsideCanvas);
    };
    match event.source {
        DragSource::Palette(field_type) => {
            if to > fields.len() {
                return DesignerCommand::Noop(NoopReason::InvalidIndex);
            }
            let spec = FieldSpec::of_type(field_type).keyed(&next_field_key(fields));
            DesignerCommand::Insert { spec, at: to }
        }
        DragSource::Canvas(from) => {
            let ids: Vec<String> = fields.iter().map(|f| f.id.clone()).collect();
            match move_within(&ids, from, to) {
                Some(order) if order == ids => DesignerCommand::Noop(NoopReason::Unmoved),
                Some(order) => DesignerCommand::Reorder(order),
                None => DesignerCommand::Noop(NoopReason::InvalidIndex),
            }
        }
    }
}

/// Remove the item at `from`, insert it at `to`. `None` if either index is
/// out of range.
pub fn move_within<T: Clone>(items: &[T], from: usize, to: usize) -> Option<Vec<T>> {
    if from >= items.len() || to >= items.len() {
        return None;
    }
    let mut out = items.to_vec();
    let moved = out.remove(from);
    out.insert(to, moved);
    Some(out)
}

/// Time-based key not used by any field in the snapshot.
fn next_field_key(fields: &[Field]) -> String {
    let mut suffix = time::now_unix_millis();
    loop {
        let key = format!("field_{}", suffix);
        if !fields.iter().any(|f| f.field_key == key) {
            return key;
        }
        suffix += 1;
    }
}

/// An open designer session for one module.
///
/// Holds a snapshot of the module's fields and the current selection. The
/// snapshot is reloaded after every successful mutation and after a rejected
/// reorder.
pub struct Designer<'a> {
    store: &'a Store,
    scope: AccountScope,
    module_id: String,
    fields: Vec<Field>,
    selected: Option<String>,
}

impl<'a> Designer<'a> {
    pub fn open(store: &'a Store, scope: AccountScope, module_id: &str) -> Result<Self, ForgeError> {
        let fields = schema::list_fields(store, &scope, module_id)?;
        Ok(Self {
            store,
            scope,
            module_id: module_id.to_string(),
            fields,
            selected: None,
        })
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn refresh(&mut self) -> Result<(), ForgeError> {
        self.fields = schema::list_fields(self.store, &self.scope, &self.module_id)?;
        if let Some(id) = &self.selected {
            if !self.fields.iter().any(|f| &f.id == id) {
                self.selected = None;
            }
        }
        Ok(())
    }

    pub fn select(&mut self, field_id: &str) -> Result<&Field, ForgeError> {
        let field = self
            .fields
            .iter()
            .find(|f| f.id == field_id)
            .ok_or_else(|| ForgeError::FieldNotFound(field_id.to_string()))?;
        self.selected = Some(field.id.clone());
        Ok(field)
    }

    pub fn selected(&self) -> Option<&Field> {
        let id = self.selected.as_deref()?;
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn plan(&self, event: &DragEvent) -> DesignerCommand {
        plan(&self.fields, event)
    }

    pub fn handle_drop(&mut self, event: &DragEvent) -> Result<DropOutcome, ForgeError> {
        let command = self.plan(event);
        self.apply(&command)
    }

    /// Execute a planned command. Re-applying the same command is safe.
    pub fn apply(&mut self, command: &DesignerCommand) -> Result<DropOutcome, ForgeError> {
        match command {
            DesignerCommand::Noop(reason) => {
                tracing::debug!(?reason, "designer drop ignored");
                Ok(DropOutcome::Ignored(*reason))
            }
            DesignerCommand::Insert { spec, at } => {
                let field = schema::create_field(self.store, &self.scope, &self.module_id, spec.clone())?;
                self.refresh()?;

                let without_new: Vec<String> = self
                    .fields
                    .iter()
                    .filter(|f| f.id != field.id)
                    .map(|f| f.id.clone())
                    .collect();
                let at = (*at).min(without_new.len());
                if at < without_new.len() {
                    let mut order = without_new;
                    order.insert(at, field.id.clone());
                    self.submit_order(&order)?;
                }

                let placed = self
                    .fields
                    .iter()
                    .find(|f| f.id == field.id)
                    .cloned()
                    .unwrap_or(field);
                self.selected = Some(placed.id.clone());
                Ok(DropOutcome::Inserted(placed))
            }
            DesignerCommand::Reorder(order) => {
                self.submit_order(order)?;
                Ok(DropOutcome::Reordered)
            }
        }
    }

    fn submit_order(&mut self, order: &[String]) -> Result<(), ForgeError> {
        match schema::reorder_fields(self.store, &self.scope, &self.module_id, order) {
            Ok(fields) => {
                self.fields = fields;
                Ok(())
            }
            Err(e) => {
                // stale canvas: reload so the next gesture plans against the truth
                if matches!(e, ForgeError::InvalidReorderSet(_)) {
                    self.refresh()?;
                }
                Err(e)
            }
        }
    }

    /// Commit one property change. Each call is a standalone update.
    pub fn edit_property(&mut self, field_id: &str, edit: PropertyEdit) -> Result<Field, ForgeError> {
        let updated = schema::update_field(self.store, &self.scope, field_id, edit.into_patch())?;
        self.refresh()?;
        Ok(updated)
    }

    pub fn delete_field(&mut self, field_id: &str) -> Result<(), ForgeError> {
        schema::delete_field(self.store, &self.scope, field_id)?;
        if self.selected.as_deref() == Some(field_id) {
            self.selected = None;
        }
        self.refresh()
    }

    pub fn delete_selected(&mut self) -> Result<(), ForgeError> {
        let Some(id) = self.selected.clone() else {
            return Ok(());
        };
        self.delete_field(&id)
    }
}
