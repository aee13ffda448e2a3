use recordforge::core::error::ForgeError;
use recordforge::core::store::{AccountScope, Session, Store};
use recordforge::engine::field_types::FieldType;
use recordforge::engine::records::{self, RecordFilter, Submission};
use recordforge::engine::schema::{self, FieldPatch, FieldSpec, Module};
use recordforge::engine::values::FieldValue;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::{TempDir, tempdir};

fn open_store() -> (TempDir, Store) {
    let tmp = tempdir().expect("tempdir");
    let store = Store::open(tmp.path()).expect("open store");
    (tmp, store)
}

fn scope(user: &str) -> AccountScope {
    AccountScope::from_session(&Session::authenticated(user)).expect("scope")
}

fn submission(v: serde_json::Value) -> Submission {
    v.as_object().cloned().expect("object literal")
}

/// name (required text), email (unique), amount (number), status (select, default "lead")
fn contacts(store: &Store, acct: &AccountScope) -> Module {
    let module = schema::create_module(store, acct, "Contacts").expect("module");
    let specs = [
        FieldSpec::of_type(FieldType::Text).keyed("name").required(),
        FieldSpec::of_type(FieldType::Email).keyed("email").unique(),
        FieldSpec::of_type(FieldType::Number).keyed("amount"),
        FieldSpec::of_type(FieldType::Select)
            .keyed("status")
            .choices(&["lead", "active"])
            .default_value(json!("lead")),
    ];
    for spec in specs {
        schema::create_field(store, acct, &module.id, spec).expect("field");
    }
    module
}

#[test]
fn missing_required_value_is_rejected_and_not_persisted() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = contacts(&store, &acct);

    let err = records::create_record(&store, &acct, &module.id, &submission(json!({"email": "a@x.io"})))
        .unwrap_err();
    assert!(matches!(err, ForgeError::RequiredFieldMissing(ref k) if k == "name"));

    let blank = submission(json!({"name": "   "}));
    assert!(matches!(
        records::create_record(&store, &acct, &module.id, &blank),
        Err(ForgeError::RequiredFieldMissing(_))
    ));

    let listed = records::list_records(&store, &acct, &module.id, None).expect("list");
    assert!(listed.is_empty());
}

#[test]
fn duplicate_unique_value_is_rejected_and_first_record_kept() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = contacts(&store, &acct);

    let first = records::create_record(
        &store,
        &acct,
        &module.id,
        &submission(json!({"name": "Ada", "email": "ada@x.io"})),
    )
    .expect("first");
    let err = records::create_record(
        &store,
        &acct,
        &module.id,
        &submission(json!({"name": "Ada Two", "email": "ada@x.io"})),
    )
    .unwrap_err();
    assert!(matches!(err, ForgeError::UniqueConstraintViolation(ref k) if k == "email"));

    let listed = records::list_records(&store, &acct, &module.id, None).expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], first);

    // empty values never collide
    records::create_record(&store, &acct, &module.id, &submission(json!({"name": "B"}))).expect("b");
    records::create_record(&store, &acct, &module.id, &submission(json!({"name": "C"}))).expect("c");
}

#[test]
fn numeric_string_coerces_the_same_way_every_time() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = contacts(&store, &acct);

    for name in ["one", "two"] {
        let r = records::create_record(
            &store,
            &acct,
            &module.id,
            &submission(json!({"name": name, "amount": "42"})),
        )
        .expect("create");
        assert_eq!(r.value("amount"), Some(&FieldValue::Number(42.0)));
        let read = records::get_record(&store, &acct, &r.id).expect("get");
        assert_eq!(read.value("amount"), Some(&FieldValue::Number(42.0)));
    }

    let junk = records::create_record(
        &store,
        &acct,
        &module.id,
        &submission(json!({"name": "three", "amount": "forty-two"})),
    )
    .expect("lenient create");
    assert_eq!(junk.value("amount"), Some(&FieldValue::Number(0.0)));
}

#[test]
fn defaults_seed_unsubmitted_fields() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = contacts(&store, &acct);

    let r = records::create_record(&store, &acct, &module.id, &submission(json!({"name": "Ada"})))
        .expect("create");
    assert_eq!(r.value("status"), Some(&FieldValue::Text("lead".into())));
    assert_eq!(r.value("email"), Some(&FieldValue::Text(String::new())));
    assert_eq!(r.value("amount"), Some(&FieldValue::Number(0.0)));
}

#[test]
fn unknown_keys_are_rejected() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = contacts(&store, &acct);

    let err = records::create_record(
        &store,
        &acct,
        &module.id,
        &submission(json!({"name": "Ada", "nickname": "A"})),
    )
    .unwrap_err();
    assert!(matches!(err, ForgeError::UnknownField(ref k) if k == "nickname"));
}

#[test]
fn partial_update_merges_and_rechecks_constraints() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = contacts(&store, &acct);

    let ada = records::create_record(
        &store,
        &acct,
        &module.id,
        &submission(json!({"name": "Ada", "email": "ada@x.io", "amount": 5})),
    )
    .expect("ada");
    let bob = records::create_record(
        &store,
        &acct,
        &module.id,
        &submission(json!({"name": "Bob", "email": "bob@x.io"})),
    )
    .expect("bob");

    let updated = records::update_record(&store, &acct, &ada.id, &submission(json!({"amount": "7.5"})))
        .expect("update");
    assert_eq!(updated.value("amount"), Some(&FieldValue::Number(7.5)));
    assert_eq!(updated.value("name"), Some(&FieldValue::Text("Ada".into())));
    assert_eq!(updated.value("email"), Some(&FieldValue::Text("ada@x.io".into())));

    assert!(matches!(
        records::update_record(&store, &acct, &ada.id, &submission(json!({"name": ""}))),
        Err(ForgeError::RequiredFieldMissing(_))
    ));
    assert!(matches!(
        records::update_record(&store, &acct, &bob.id, &submission(json!({"email": "ada@x.io"}))),
        Err(ForgeError::UniqueConstraintViolation(_))
    ));

    // a record may keep its own value, and a released value can be reused
    records::update_record(&store, &acct, &ada.id, &submission(json!({"email": "ada@x.io"})))
        .expect("same value");
    records::update_record(&store, &acct, &ada.id, &submission(json!({"email": "ada@new.io"})))
        .expect("move");
    records::update_record(&store, &acct, &bob.id, &submission(json!({"email": "ada@x.io"})))
        .expect("reuse released value");
}

#[test]
fn deleting_a_record_releases_unique_values() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = contacts(&store, &acct);

    let sub = submission(json!({"name": "Ada", "email": "ada@x.io"}));
    let ada = records::create_record(&store, &acct, &module.id, &sub).expect("ada");
    records::delete_record(&store, &acct, &ada.id).expect("delete");

    assert!(matches!(
        records::get_record(&store, &acct, &ada.id),
        Err(ForgeError::RecordNotFound(_))
    ));
    assert!(matches!(
        records::delete_record(&store, &acct, &ada.id),
        Err(ForgeError::RecordNotFound(_))
    ));
    records::create_record(&store, &acct, &module.id, &sub).expect("value free again");
}

#[test]
fn records_are_invisible_to_other_accounts() {
    let (_tmp, store) = open_store();
    let owner = scope("acct-1");
    let other = scope("acct-2");
    let module = contacts(&store, &owner);
    let r = records::create_record(&store, &owner, &module.id, &submission(json!({"name": "Ada"})))
        .expect("create");

    assert!(matches!(
        records::get_record(&store, &other, &r.id),
        Err(ForgeError::RecordNotFound(_))
    ));
    assert!(matches!(
        records::update_record(&store, &other, &r.id, &submission(json!({"name": "X"}))),
        Err(ForgeError::RecordNotFound(_))
    ));
    assert!(matches!(
        records::create_record(&store, &other, &module.id, &submission(json!({"name": "X"}))),
        Err(ForgeError::ModuleNotFound(_))
    ));
}

#[test]
fn filter_matches_display_field_case_insensitively() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = contacts(&store, &acct);
    for (name, email) in [("Ada Lovelace", "ada@x.io"), ("Grace Hopper", "grace@x.io"), ("Alan", "turing@x.io")] {
        records::create_record(
            &store,
            &acct,
            &module.id,
            &submission(json!({"name": name, "email": email})),
        )
        .expect("create");
    }

    let hits = records::list_records(&store, &acct, &module.id, Some(&RecordFilter::contains("LOVE")))
        .expect("filter");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].value("name"), Some(&FieldValue::Text("Ada Lovelace".into())));

    let by_email = records::list_records(
        &store,
        &acct,
        &module.id,
        Some(&RecordFilter::contains("turing").on("email")),
    )
    .expect("filter on email");
    assert_eq!(by_email.len(), 1);

    assert!(matches!(
        records::list_records(&store, &acct, &module.id, Some(&RecordFilter::contains("a").on("nope"))),
        Err(ForgeError::UnknownField(_))
    ));

    let all = records::list_records(&store, &acct, &module.id, Some(&RecordFilter::contains("  ")))
        .expect("blank query");
    assert_eq!(all.len(), 3);
}

#[test]
fn retyped_field_reads_old_values_as_raw() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = schema::create_module(&store, &acct, "Notes").expect("module");
    let code = schema::create_field(&store, &acct, &module.id, FieldSpec::of_type(FieldType::Text).keyed("code"))
        .expect("field");
    let r = records::create_record(&store, &acct, &module.id, &submission(json!({"code": "A-12"})))
        .expect("create");

    let retype = FieldPatch {
        field_type: Some(FieldType::Number),
        ..FieldPatch::default()
    };
    schema::update_field(&store, &acct, &code.id, retype).expect("retype");

    let read = records::get_record(&store, &acct, &r.id).expect("get");
    assert_eq!(read.value("code"), Some(&FieldValue::Raw(json!("A-12"))));

    let fresh = records::create_record(&store, &acct, &module.id, &submission(json!({"code": "12"})))
        .expect("create after retype");
    assert_eq!(fresh.value("code"), Some(&FieldValue::Number(12.0)));
}

#[test]
fn enabling_unique_fails_on_existing_duplicates() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = schema::create_module(&store, &acct, "Tags").expect("module");
    let label = schema::create_field(&store, &acct, &module.id, FieldSpec::of_type(FieldType::Text).keyed("label"))
        .expect("field");
    for _ in 0..2 {
        records::create_record(&store, &acct, &module.id, &submission(json!({"label": "dup"})))
            .expect("create");
    }

    let make_unique = FieldPatch {
        is_unique: Some(true),
        ..FieldPatch::default()
    };
    assert!(matches!(
        schema::update_field(&store, &acct, &label.id, make_unique),
        Err(ForgeError::UniqueConstraintViolation(_))
    ));
    let unchanged = schema::get_field(&store, &acct, &label.id).expect("get");
    assert!(!unchanged.is_unique);
}

#[test]
fn unsubmitted_unique_numbers_and_flags_do_not_collide() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = schema::create_module(&store, &acct, "Seats").expect("module");
    for spec in [
        FieldSpec::of_type(FieldType::Text).keyed("name"),
        FieldSpec::of_type(FieldType::Number).keyed("seat").unique(),
        FieldSpec::of_type(FieldType::Checkbox).keyed("primary").unique(),
    ] {
        schema::create_field(&store, &acct, &module.id, spec).expect("field");
    }

    for name in ["a", "b", "c"] {
        let r = records::create_record(&store, &acct, &module.id, &submission(json!({"name": name})))
            .expect("record without seat");
        assert_eq!(r.value("seat"), Some(&FieldValue::Number(0.0)));
    }

    // submitted values still claim, zero included
    records::create_record(&store, &acct, &module.id, &submission(json!({"name": "d", "seat": 0})))
        .expect("first explicit zero");
    assert!(matches!(
        records::create_record(&store, &acct, &module.id, &submission(json!({"name": "e", "seat": "0"}))),
        Err(ForgeError::UniqueConstraintViolation(ref k)) if k == "seat"
    ));
}

#[test]
fn enabling_unique_ignores_seeded_values() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = schema::create_module(&store, &acct, "Seats").expect("module");
    schema::create_field(&store, &acct, &module.id, FieldSpec::of_type(FieldType::Text).keyed("name"))
        .expect("name");
    let seat = schema::create_field(&store, &acct, &module.id, FieldSpec::of_type(FieldType::Number).keyed("seat"))
        .expect("seat");
    for name in ["a", "b"] {
        records::create_record(&store, &acct, &module.id, &submission(json!({"name": name})))
            .expect("create");
    }
    records::create_record(&store, &acct, &module.id, &submission(json!({"name": "c", "seat": 4})))
        .expect("seated");

    let make_unique = FieldPatch {
        is_unique: Some(true),
        ..FieldPatch::default()
    };
    schema::update_field(&store, &acct, &seat.id, make_unique).expect("enable unique");
    assert!(matches!(
        records::create_record(&store, &acct, &module.id, &submission(json!({"name": "d", "seat": 4}))),
        Err(ForgeError::UniqueConstraintViolation(_))
    ));
}

#[test]
fn concurrent_creates_with_same_unique_value_admit_one() {
    let (_tmp, store) = open_store();
    let acct = scope("acct-1");
    let module = contacts(&store, &acct);

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let store = Arc::new(store);
    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let store = Arc::clone(&store);
            let acct = acct.clone();
            let module_id = module.id.clone();
            thread::spawn(move || {
                let sub = submission(json!({"name": format!("n{}", i), "email": "same@x.io"}));
                barrier.wait();
                records::create_record(&store, &acct, &module_id, &sub)
            })
        })
        .collect();

    let mut created = 0;
    for h in handles {
        match h.join().expect("join") {
            Ok(_) => created += 1,
            Err(ForgeError::UniqueConstraintViolation(k)) => assert_eq!(k, "email"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);
    let listed = records::list_records(&store, &acct, &module.id, None).expect("list");
    assert_eq!(listed.len(), 1);
}
