use recordforge::core::error::ForgeError;
use recordforge::core::store::{AccountScope, Session, Store};
use recordforge::engine::bootstrap::{self, LegacyClient, LegacySource};
use recordforge::engine::field_types::FieldType;
use recordforge::engine::records::{self, Submission};
use recordforge::engine::schema;
use recordforge::engine::values::FieldValue;
use rusqlite::{Connection, params};
use serde_json::json;
use tempfile::{TempDir, tempdir};

fn open_store() -> (TempDir, Store) {
    let tmp = tempdir().expect("tempdir");
    let store = Store::open(tmp.path()).expect("open store");
    (tmp, store)
}

fn scope(user: &str) -> AccountScope {
    AccountScope::from_session(&Session::authenticated(user)).expect("scope")
}

fn client(name: &str, email: Option<&str>) -> LegacyClient {
    LegacyClient {
        name: name.to_string(),
        email: email.map(str::to_string),
        ..LegacyClient::default()
    }
}

fn seed_legacy(store: &Store, acct: &AccountScope) {
    let rows = vec![
        LegacyClient {
            status: Some("active".into()),
            contract_value: Some(1200.0),
            company: Some("Analytical Engines".into()),
            ..client("Ada", Some("ada@x.io"))
        },
        client("Grace", Some("grace@x.io")),
        client("Alan", None),
    ];
    bootstrap::insert_legacy_clients(store, acct, &rows).expect("seed legacy rows");
}

#[test]
fn first_run_creates_module_fields_and_copies_rows() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    seed_legacy(&store, &acct);
    bootstrap::insert_legacy_clients(&store, &scope("acct-2"), &[client("Other", None)])
        .expect("other account row");

    let outcome = bootstrap::bootstrap_clients(&store, &acct).expect("bootstrap");
    assert!(outcome.created);
    assert!(!outcome.repaired);
    assert_eq!(outcome.module.name, "Clients");
    assert_eq!(outcome.fields_created, 8);
    assert_eq!(outcome.records_copied, 3);

    let fields = schema::list_fields(&store, &acct, &outcome.module.id).expect("fields");
    let keys: Vec<&str> = fields.iter().map(|f| f.field_key.as_str()).collect();
    assert_eq!(
        keys,
        vec!["name", "email", "phone", "company", "status", "contract_value", "website", "notes"]
    );
    let orders: Vec<u32> = fields.iter().map(|f| f.display_order).collect();
    assert_eq!(orders, (0..8).collect::<Vec<u32>>());
    let name = &fields[0];
    assert!(name.is_required && name.is_system);
    assert!(fields[1].is_unique);
    assert_eq!(fields[4].field_type, FieldType::Select);
    assert_eq!(fields[5].field_type, FieldType::Currency);

    let rows = records::list_records(&store, &acct, &outcome.module.id, None).expect("records");
    assert_eq!(rows.len(), 3);
    let ada = rows
        .iter()
        .find(|r| r.value("name") == Some(&FieldValue::Text("Ada".into())))
        .expect("ada copied");
    assert_eq!(ada.value("status"), Some(&FieldValue::Text("active".into())));
    assert_eq!(ada.value("contract_value"), Some(&FieldValue::Number(1200.0)));
    // missing legacy status falls back to the field default
    let grace = rows
        .iter()
        .find(|r| r.value("name") == Some(&FieldValue::Text("Grace".into())))
        .expect("grace copied");
    assert_eq!(grace.value("status"), Some(&FieldValue::Text("lead".into())));
}

#[test]
fn second_run_is_a_noop() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    seed_legacy(&store, &acct);

    let first = bootstrap::bootstrap_clients(&store, &acct).expect("first");
    let second = bootstrap::bootstrap_clients(&store, &acct).expect("second");
    assert!(!second.created);
    assert_eq!(second.module.id, first.module.id);
    assert_eq!(second.records_copied, 0);

    let modules = schema::list_modules(&store, &acct).expect("modules");
    assert_eq!(modules.len(), 1);
    assert_eq!(
        schema::list_fields(&store, &acct, &first.module.id).expect("fields").len(),
        8
    );
    assert_eq!(
        records::list_records(&store, &acct, &first.module.id, None)
            .expect("records")
            .len(),
        3
    );
}

#[test]
fn bootstrapped_module_enforces_unique_email() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    seed_legacy(&store, &acct);
    let outcome = bootstrap::bootstrap_clients(&store, &acct).expect("bootstrap");

    let dup: Submission = json!({"name": "Imposter", "email": "ada@x.io"})
        .as_object()
        .cloned()
        .expect("object");
    assert!(matches!(
        records::create_record(&store, &acct, &outcome.module.id, &dup),
        Err(ForgeError::UniqueConstraintViolation(_))
    ));
}

#[test]
fn colliding_legacy_values_are_still_copied() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    bootstrap::insert_legacy_clients(
        &store,
        &acct,
        &[client("One", Some("same@x.io")), client("Two", Some("same@x.io"))],
    )
    .expect("seed");

    let outcome = bootstrap::bootstrap_clients(&store, &acct).expect("bootstrap");
    assert_eq!(outcome.records_copied, 2);
}

struct FailingSource;

impl LegacySource for FailingSource {
    fn describe(&self) -> String {
        "failing".to_string()
    }

    fn load_rows(&self, _conn: &Connection, _scope: &AccountScope) -> Result<Vec<Submission>, ForgeError> {
        Err(ForgeError::Validation("legacy source unavailable".to_string()))
    }
}

#[test]
fn failed_run_leaves_no_module_behind() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");

    let err = bootstrap::ensure_module(
        &store,
        &acct,
        "Clients",
        &bootstrap::client_template(),
        &FailingSource,
    )
    .unwrap_err();
    assert!(matches!(err, ForgeError::Validation(_)));
    assert!(schema::list_modules(&store, &acct).expect("modules").is_empty());

    let retry = bootstrap::bootstrap_clients(&store, &acct).expect("retry");
    assert!(retry.created);
    assert_eq!(schema::list_modules(&store, &acct).expect("modules").len(), 1);
}

#[test]
fn leftover_provisioning_module_is_rebuilt() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    seed_legacy(&store, &acct);

    // simulate a run that stopped after writing the module and one field
    let conn = Connection::open(store.db_path()).expect("open db");
    conn.execute(
        "INSERT INTO modules(id, account_id, name, state, created_at)
         VALUES('STALE', 'acct-1', 'Clients', 'provisioning', '0Z')",
        [],
    )
    .expect("stale module");
    conn.execute(
        "INSERT INTO fields(id, module_id, field_key, label, field_type, display_order, created_at, updated_at)
         VALUES('STALE-F', 'STALE', 'name', 'Name', 'text', 0, '0Z', '0Z')",
        [],
    )
    .expect("stale field");
    drop(conn);

    // half-built modules are invisible
    assert!(schema::list_modules(&store, &acct).expect("modules").is_empty());
    assert!(schema::find_module_by_name(&store, &acct, "Clients").expect("find").is_none());

    let outcome = bootstrap::bootstrap_clients(&store, &acct).expect("bootstrap");
    assert!(outcome.created);
    assert!(outcome.repaired);
    assert_ne!(outcome.module.id, "STALE");

    let conn = Connection::open(store.db_path()).expect("open db");
    let stale_fields: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM fields WHERE module_id = ?1",
            params!["STALE"],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(stale_fields, 0);
    assert_eq!(
        schema::list_fields(&store, &acct, &outcome.module.id).expect("fields").len(),
        8
    );
}
