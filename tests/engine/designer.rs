use recordforge::core::error::ForgeError;
use recordforge::core::store::{AccountScope, Session, Store};
use recordforge::engine::designer::{
    self, Designer, DesignerCommand, DragEvent, DragSource, DropOutcome, NoopReason, PropertyEdit,
};
use recordforge::engine::field_types::FieldType;
use recordforge::engine::schema::{self, FieldSpec, Module};
use tempfile::{TempDir, tempdir};

fn open_store() -> (TempDir, Store) {
    let tmp = tempdir().expect("tempdir");
    let store = Store::open(tmp.path()).expect("open store");
    (tmp, store)
}

fn scope() -> AccountScope {
    AccountScope::from_session(&Session::authenticated("acct-1")).expect("scope")
}

fn module_with(store: &Store, acct: &AccountScope, keys: &[&str]) -> Module {
    let module = schema::create_module(store, acct, "Projects").expect("module");
    for key in keys {
        schema::create_field(store, acct, &module.id, FieldSpec::of_type(FieldType::Text).keyed(key))
            .expect("field");
    }
    module
}

fn keys(session: &Designer<'_>) -> Vec<String> {
    session.fields().iter().map(|f| f.field_key.clone()).collect()
}

fn drop_at(source: DragSource, destination: Option<usize>) -> DragEvent {
    DragEvent {
        source,
        destination,
    }
}

#[test]
fn palette_lists_every_field_type() {
    let palette = designer::palette();
    assert_eq!(palette.len(), FieldType::ALL.len());
    let select = palette
        .iter()
        .find(|p| p.field_type == FieldType::Select)
        .expect("select in palette");
    assert!(select.supports_options);
}

#[test]
fn palette_drop_at_end_appends_and_selects() {
    let (_tmp, store) = open_store();
    let acct = scope();
    let module = module_with(&store, &acct, &["a", "b"]);
    let mut session = Designer::open(&store, acct, &module.id).expect("open");

    let outcome = session
        .handle_drop(&drop_at(DragSource::Palette(FieldType::Email), Some(2)))
        .expect("drop");
    let DropOutcome::Inserted(field) = outcome else {
        panic!("expected insert");
    };
    assert_eq!(field.field_type, FieldType::Email);
    assert_eq!(field.display_order, 2);
    assert_eq!(session.selected().map(|f| f.id.clone()), Some(field.id));
    assert_eq!(session.fields().len(), 3);
}

#[test]
fn palette_drop_mid_canvas_places_field_at_index() {
    let (_tmp, store) = open_store();
    let acct = scope();
    let module = module_with(&store, &acct, &["a", "b", "c"]);
    let mut session = Designer::open(&store, acct.clone(), &module.id).expect("open");

    let outcome = session
        .handle_drop(&drop_at(DragSource::Palette(FieldType::Number), Some(1)))
        .expect("drop");
    let DropOutcome::Inserted(field) = outcome else {
        panic!("expected insert");
    };
    assert_eq!(field.display_order, 1);
    assert_eq!(keys(&session)[0], "a");
    assert_eq!(keys(&session)[1], field.field_key);
    assert_eq!(keys(&session)[2..].to_vec(), vec!["b", "c"]);

    let stored: Vec<u32> = schema::list_fields(&store, &acct, &module.id)
        .expect("list")
        .iter()
        .map(|f| f.display_order)
        .collect();
    assert_eq!(stored, vec![0, 1, 2, 3]);
}

#[test]
fn reapplying_a_planned_insert_does_not_duplicate() {
    let (_tmp, store) = open_store();
    let acct = scope();
    let module = module_with(&store, &acct, &["a"]);
    let mut session = Designer::open(&store, acct, &module.id).expect("open");

    let command = session.plan(&drop_at(DragSource::Palette(FieldType::Date), Some(1)));
    assert!(matches!(command, DesignerCommand::Insert { .. }));
    session.apply(&command).expect("first apply");
    session.apply(&command).expect("retried apply");
    assert_eq!(session.fields().len(), 2);
}

#[test]
fn canvas_drag_submits_full_order() {
    let (_tmp, store) = open_store();
    let acct = scope();
    let module = module_with(&store, &acct, &["a", "b", "c", "d"]);
    let mut session = Designer::open(&store, acct, &module.id).expect("open");

    let outcome = session
        .handle_drop(&drop_at(DragSource::Canvas(0), Some(2)))
        .expect("drag");
    assert!(matches!(outcome, DropOutcome::Reordered));
    assert_eq!(keys(&session), vec!["b", "c", "a", "d"]);
    let orders: Vec<u32> = session.fields().iter().map(|f| f.display_order).collect();
    assert_eq!(orders, vec![0, 1, 2, 3]);
}

#[test]
fn invalid_drops_are_noops() {
    let (_tmp, store) = open_store();
    let acct = scope();
    let module = module_with(&store, &acct, &["a", "b"]);
    let mut session = Designer::open(&store, acct, &module.id).expect("open");
    let before = session.fields().to_vec();

    let cases = [
        (drop_at(DragSource::Canvas(0), None), NoopReason::OutsideCanvas),
        (drop_at(DragSource::Palette(FieldType::Text), None), NoopReason::OutsideCanvas),
        (drop_at(DragSource::Canvas(1), Some(1)), NoopReason::Unmoved),
        (drop_at(DragSource::Canvas(5), Some(0)), NoopReason::InvalidIndex),
        (drop_at(DragSource::Palette(FieldType::Text), Some(9)), NoopReason::InvalidIndex),
    ];
    for (event, reason) in cases {
        let outcome = session.handle_drop(&event).expect("noop");
        assert!(matches!(outcome, DropOutcome::Ignored(r) if r == reason));
    }
    assert_eq!(session.fields(), before.as_slice());
}

#[test]
fn stale_reorder_is_rejected_and_canvas_reloaded() {
    let (_tmp, store) = open_store();
    let acct = scope();
    let module = module_with(&store, &acct, &["a", "b"]);
    let mut session = Designer::open(&store, acct.clone(), &module.id).expect("open");

    // another editor adds a field behind this session's back
    schema::create_field(&store, &acct, &module.id, FieldSpec::of_type(FieldType::Text).keyed("c"))
        .expect("concurrent add");

    let err = session
        .handle_drop(&drop_at(DragSource::Canvas(0), Some(1)))
        .unwrap_err();
    assert!(matches!(err, ForgeError::InvalidReorderSet(_)));
    assert_eq!(keys(&session), vec!["a", "b", "c"]);
}

#[test]
fn property_edits_commit_individually() {
    let (_tmp, store) = open_store();
    let acct = scope();
    let module = module_with(&store, &acct, &["a"]);
    let mut session = Designer::open(&store, acct, &module.id).expect("open");
    let id = session.fields()[0].id.clone();
    session.select(&id).expect("select");

    session
        .edit_property(&id, PropertyEdit::Label("Title".into()))
        .expect("label");
    let again = session
        .edit_property(&id, PropertyEdit::Label("Title".into()))
        .expect("same label again");
    assert_eq!(again.label, "Title");

    session
        .edit_property(&id, PropertyEdit::Required(true))
        .expect("required");
    session
        .edit_property(&id, PropertyEdit::ColumnSpan(2))
        .expect("span");
    let selected = session.selected().expect("still selected");
    assert!(selected.is_required);
    assert_eq!(selected.column_span, 2);
    assert_eq!(selected.label, "Title");

    session.delete_selected().expect("delete");
    assert!(session.selected().is_none());
    assert!(session.fields().is_empty());
}
