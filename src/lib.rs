//! recordforge: runtime-defined record types on SQLite.
//!
//! Users define **modules** (record types) at runtime, give them ordered,
//! typed **fields**, and store **records** validated against the current field
//! list. A field designer turns drag/drop gestures into schema changes, and a
//! one-shot bootstrap converts the old hard-coded client table into a regular
//! module.
//!
//! # Architecture
//!
//! ## The Thin Waist
//!
//! All reads and writes route through `DbBroker`, which:
//! - runs schema migrations on first touch
//! - wraps every mutation in one IMMEDIATE transaction, serialized per database
//! - appends one audit line per mutation to `broker.events.jsonl`
//!
//! ## Account scoping
//!
//! Every engine call takes an `AccountScope`, built only from an authenticated
//! `Session`. Modules, fields and records of other accounts are invisible.
//!
//! # Examples
//!
//! ```bash
//! export RECORDFORGE_USER=acct-1
//! recordforge module create Projects
//! recordforge field add <MODULE_ID> --type text --key title --required
//! recordforge record add <MODULE_ID> --data '{"title": "Launch"}'
//! recordforge bootstrap
//! recordforge stats <MODULE_ID> --format json
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: store, config, logging, pool, broker, errors
//! - [`engine`]: field types, schema store, record store, designer, bootstrap, stats

mod cli;
pub mod core;
pub mod engine;

use crate::cli::{
    Cli, Command, DesignerCommandCli, FieldCommand, LegacyCommand, ModuleCommand, OutputFormat,
    RecordCommand,
};
use crate::core::broker;
use crate::core::error::ForgeError;
use crate::core::logging;
use crate::core::store::{AccountScope, Session, Store};
use crate::core::time::command_envelope;
use crate::engine::bootstrap::{self, LegacyClient};
use crate::engine::designer::{self, Designer, DragEvent, DragSource, DropOutcome};
use crate::engine::records::{self, RecordFilter, Submission};
use crate::engine::schema::{self, FieldOptions, FieldPatch, FieldSpec};
use crate::engine::stats;
use clap::Parser;
use colored::Colorize;
use serde_json::{Value as JsonValue, json};

pub fn run() -> Result<(), ForgeError> {
    let cli = Cli::parse();
    let store = Store::open(&cli.root)?;
    logging::init(&store.config.log_filter);

    let result = dispatch(&cli, &store);
    match (&result, cli.format) {
        (Err(e), OutputFormat::Json) => {
            let out = command_envelope(
                command_name(&cli.command),
                "error",
                json!({ "error": { "code": e.code(), "message": e.to_string() } }),
            );
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        (Err(_), OutputFormat::Text) => {}
        (Ok(out), OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(out)?);
        }
        (Ok(out), OutputFormat::Text) => print_text(&cli.command, out),
    }
    result.map(|_| ())
}

fn scope_for(cli: &Cli) -> Result<AccountScope, ForgeError> {
    let session = match cli.user.as_deref() {
        Some(user) => Session::authenticated(user),
        None => Session::anonymous(),
    };
    AccountScope::from_session(&session)
}

fn parse_json(raw: &str) -> Result<JsonValue, ForgeError> {
    Ok(serde_json::from_str(raw)?)
}

fn parse_submission(raw: &str) -> Result<Submission, ForgeError> {
    match parse_json(raw)? {
        JsonValue::Object(map) => Ok(map),
        _ => Err(ForgeError::Validation(
            "record data must be a JSON object".to_string(),
        )),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Module(ModuleCommand::Create { .. }) => "module.create",
        Command::Module(ModuleCommand::List) => "module.list",
        Command::Module(ModuleCommand::Show { .. }) => "module.show",
        Command::Field(FieldCommand::Add { .. }) => "field.add",
        Command::Field(FieldCommand::List { .. }) => "field.list",
        Command::Field(FieldCommand::Edit { .. }) => "field.edit",
        Command::Field(FieldCommand::Delete { .. }) => "field.delete",
        Command::Field(FieldCommand::Reorder { .. }) => "field.reorder",
        Command::Record(RecordCommand::Add { .. }) => "record.add",
        Command::Record(RecordCommand::Get { .. }) => "record.get",
        Command::Record(RecordCommand::List { .. }) => "record.list",
        Command::Record(RecordCommand::Edit { .. }) => "record.edit",
        Command::Record(RecordCommand::Delete { .. }) => "record.delete",
        Command::Designer(DesignerCommandCli::Palette) => "designer.palette",
        Command::Designer(DesignerCommandCli::Drop { .. }) => "designer.drop",
        Command::Designer(DesignerCommandCli::Move { .. }) => "designer.move",
        Command::Bootstrap => "bootstrap",
        Command::Legacy(LegacyCommand::Add { .. }) => "legacy.add",
        Command::Stats { .. } => "stats",
        Command::Audit => "audit",
    }
}

fn dispatch(cli: &Cli, store: &Store) -> Result<JsonValue, ForgeError> {
    let cmd = command_name(&cli.command);
    let ok = |extra: JsonValue| command_envelope(cmd, "ok", extra);

    let out = match &cli.command {
        Command::Module(sub) => {
            let scope = scope_for(cli)?;
            match sub {
                ModuleCommand::Create { name } => {
                    ok(json!({ "module": schema::create_module(store, &scope, name)? }))
                }
                ModuleCommand::List => {
                    ok(json!({ "modules": schema::list_modules(store, &scope)? }))
                }
                ModuleCommand::Show { module_id } => ok(json!({
                    "module": schema::get_module(store, &scope, module_id)?,
                    "fields": schema::list_fields(store, &scope, module_id)?,
                })),
            }
        }
        Command::Field(sub) => ok(run_field(store, &scope_for(cli)?, sub)?),
        Command::Record(sub) => ok(run_record(store, &scope_for(cli)?, sub)?),
        Command::Designer(DesignerCommandCli::Palette) => {
            ok(json!({ "palette": designer::palette() }))
        }
        Command::Designer(DesignerCommandCli::Drop {
            module_id,
            field_type,
            at,
        }) => ok(run_drop(
            store,
            scope_for(cli)?,
            module_id,
            DragSource::Palette(*field_type),
            *at,
        )?),
        Command::Designer(DesignerCommandCli::Move {
            module_id,
            from,
            to,
        }) => ok(run_drop(
            store,
            scope_for(cli)?,
            module_id,
            DragSource::Canvas(*from),
            *to,
        )?),
        Command::Bootstrap => {
            let scope = scope_for(cli)?;
            ok(json!({ "bootstrap": bootstrap::bootstrap_clients(store, &scope)? }))
        }
        Command::Legacy(LegacyCommand::Add {
            name,
            email,
            phone,
            company,
            status,
            contract_value,
            website,
            notes,
        }) => {
            let scope = scope_for(cli)?;
            let row = LegacyClient {
                name: name.clone(),
                email: email.clone(),
                phone: phone.clone(),
                company: company.clone(),
                status: status.clone(),
                contract_value: *contract_value,
                website: website.clone(),
                notes: notes.clone(),
            };
            ok(json!({ "inserted": bootstrap::insert_legacy_clients(store, &scope, &[row])? }))
        }
        Command::Stats { module_id } => {
            let scope = scope_for(cli)?;
            ok(json!({ "stats": stats::get_stats(store, &scope, module_id)? }))
        }
        Command::Audit => ok(json!({ "events": broker::read_audit_log(store)? })),
    };
    Ok(out)
}

fn run_field(store: &Store, scope: &AccountScope, sub: &FieldCommand) -> Result<JsonValue, ForgeError> {
    Ok(match sub {
        FieldCommand::Add {
            module_id,
            field_type,
            key,
            label,
            required,
            unique,
            choices,
            default,
            span,
        } => {
            let mut spec = FieldSpec::of_type(*field_type);
            spec.field_key = key.clone();
            if let Some(label) = label {
                spec.label = label.clone();
            }
            spec.is_required = *required;
            spec.is_unique = *unique;
            spec.options.choices = choices.clone();
            if let Some(raw) = default {
                spec.default_value = Some(parse_json(raw)?);
            }
            if let Some(span) = span {
                spec.column_span = *span;
            }
            json!({ "field": schema::create_field(store, scope, module_id, spec)? })
        }
        FieldCommand::List { module_id } => {
            json!({ "fields": schema::list_fields(store, scope, module_id)? })
        }
        FieldCommand::Edit {
            field_id,
            label,
            field_type,
            placeholder,
            help_text,
            required,
            unique,
            choices,
            default,
            span,
        } => {
            let options = match choices {
                Some(choices) => {
                    let mut options: FieldOptions = schema::get_field(store, scope, field_id)?.options;
                    options.choices = choices.clone();
                    Some(options)
                }
                None => None,
            };
            let default_value = match default {
                Some(raw) => match parse_json(raw)? {
                    JsonValue::Null => Some(None),
                    v => Some(Some(v)),
                },
                None => None,
            };
            let patch = FieldPatch {
                field_key: None,
                label: label.clone(),
                field_type: *field_type,
                placeholder: placeholder.clone(),
                help_text: help_text.clone(),
                is_required: *required,
                is_unique: *unique,
                default_value,
                options,
                column_span: *span,
            };
            json!({ "field": schema::update_field(store, scope, field_id, patch)? })
        }
        FieldCommand::Delete { field_id } => {
            schema::delete_field(store, scope, field_id)?;
            json!({ "deleted": field_id })
        }
        FieldCommand::Reorder {
            module_id,
            field_ids,
        } => json!({ "fields": schema::reorder_fields(store, scope, module_id, field_ids)? }),
    })
}

fn run_record(store: &Store, scope: &AccountScope, sub: &RecordCommand) -> Result<JsonValue, ForgeError> {
    Ok(match sub {
        RecordCommand::Add { module_id, data } => {
            let submission = parse_submission(data)?;
            json!({ "record": records::create_record(store, scope, module_id, &submission)? })
        }
        RecordCommand::Get { record_id } => {
            json!({ "record": records::get_record(store, scope, record_id)? })
        }
        RecordCommand::List {
            module_id,
            query,
            on,
        } => {
            let filter = query.as_deref().map(|q| {
                let f = RecordFilter::contains(q);
                match on {
                    Some(key) => f.on(key),
                    None => f,
                }
            });
            json!({ "records": records::list_records(store, scope, module_id, filter.as_ref())? })
        }
        RecordCommand::Edit { record_id, data } => {
            let submission = parse_submission(data)?;
            json!({ "record": records::update_record(store, scope, record_id, &submission)? })
        }
        RecordCommand::Delete { record_id } => {
            records::delete_record(store, scope, record_id)?;
            json!({ "deleted": record_id })
        }
    })
}

fn run_drop(
    store: &Store,
    scope: AccountScope,
    module_id: &str,
    source: DragSource,
    destination: Option<usize>,
) -> Result<JsonValue, ForgeError> {
    let mut session = Designer::open(store, scope, module_id)?;
    // a palette drop without --at lands at the end of the canvas
    let destination = match (source, destination) {
        (DragSource::Palette(_), None) => Some(session.fields().len()),
        (_, d) => d,
    };
    let outcome = match session.handle_drop(&DragEvent {
        source,
        destination,
    })? {
        DropOutcome::Inserted(field) => json!({ "outcome": "inserted", "field": field }),
        DropOutcome::Reordered => json!({ "outcome": "reordered" }),
        DropOutcome::Ignored(reason) => json!({ "outcome": "ignored", "reason": reason }),
    };
    Ok(json!({ "drop": outcome, "fields": session.fields() }))
}

fn str_at<'v>(v: &'v JsonValue, path: &[&str]) -> &'v str {
    let mut cur = v;
    for key in path {
        match cur.get(key) {
            Some(next) => cur = next,
            None => return "?",
        }
    }
    cur.as_str().unwrap_or("?")
}

fn print_fields(fields: &JsonValue) {
    let Some(arr) = fields.as_array() else {
        return;
    };
    if arr.is_empty() {
        println!("No fields.");
        return;
    }
    for f in arr {
        let mut flags = Vec::new();
        for (flag, name) in [("is_required", "required"), ("is_unique", "unique"), ("is_system", "system")] {
            if f.get(flag).and_then(JsonValue::as_bool).unwrap_or(false) {
                flags.push(name);
            }
        }
        println!(
            "  {:>2}. {} {} [{}] {} {}",
            f.get("display_order").and_then(JsonValue::as_u64).unwrap_or(0),
            str_at(f, &["field_key"]).bold(),
            str_at(f, &["label"]),
            str_at(f, &["field_type"]).cyan(),
            flags.join(",").yellow(),
            str_at(f, &["id"]).dimmed(),
        );
    }
}

fn print_record(r: &JsonValue) {
    println!("{} {}", "record".bold(), str_at(r, &["id"]));
    if let Some(values) = r.get("values").and_then(JsonValue::as_object) {
        for (k, v) in values {
            println!("  {}: {}", k.cyan(), v);
        }
    }
}

fn print_text(command: &Command, out: &JsonValue) {
    match command {
        Command::Module(ModuleCommand::List) => {
            let modules = out.get("modules").and_then(JsonValue::as_array);
            match modules {
                Some(arr) if !arr.is_empty() => {
                    for m in arr {
                        println!("- {} {}", str_at(m, &["name"]).bold(), str_at(m, &["id"]).dimmed());
                    }
                }
                _ => println!("No modules."),
            }
        }
        Command::Module(_) => {
            println!(
                "{} {} {}",
                "module".green().bold(),
                str_at(out, &["module", "name"]).bold(),
                str_at(out, &["module", "id"]).dimmed()
            );
            if let Some(fields) = out.get("fields") {
                print_fields(fields);
            }
        }
        Command::Field(FieldCommand::Add { .. }) | Command::Field(FieldCommand::Edit { .. }) => {
            println!(
                "{} {} ({})",
                "field".green().bold(),
                str_at(out, &["field", "field_key"]),
                str_at(out, &["field", "id"]).dimmed()
            );
        }
        Command::Field(FieldCommand::Delete { .. }) | Command::Record(RecordCommand::Delete { .. }) => {
            println!("{} {}", "deleted".green().bold(), str_at(out, &["deleted"]));
        }
        Command::Field(_) | Command::Designer(DesignerCommandCli::Drop { .. }) | Command::Designer(DesignerCommandCli::Move { .. }) => {
            if let Some(drop) = out.get("drop") {
                println!("{} {}", "drop".green().bold(), str_at(drop, &["outcome"]));
            }
            if let Some(fields) = out.get("fields") {
                print_fields(fields);
            }
        }
        Command::Record(RecordCommand::List { .. }) => match out.get("records").and_then(JsonValue::as_array) {
            Some(arr) if !arr.is_empty() => arr.iter().for_each(print_record),
            _ => println!("No records."),
        },
        Command::Record(_) => {
            if let Some(r) = out.get("record") {
                print_record(r);
            }
        }
        Command::Designer(DesignerCommandCli::Palette) => {
            if let Some(arr) = out.get("palette").and_then(JsonValue::as_array) {
                for item in arr {
                    println!("  {:<12} {}", str_at(item, &["field_type"]).cyan(), str_at(item, &["label"]));
                }
            }
        }
        Command::Bootstrap => {
            let b = out.get("bootstrap").cloned().unwrap_or(JsonValue::Null);
            if b.get("created").and_then(JsonValue::as_bool).unwrap_or(false) {
                println!(
                    "{} module {} with {} fields, {} records copied",
                    "created".green().bold(),
                    str_at(&b, &["module", "name"]),
                    b.get("fields_created").and_then(JsonValue::as_u64).unwrap_or(0),
                    b.get("records_copied").and_then(JsonValue::as_u64).unwrap_or(0),
                );
            } else {
                println!("module {} already exists", str_at(&b, &["module", "name"]).bold());
            }
        }
        Command::Legacy(_) => {
            println!("{} legacy row", "inserted".green().bold());
        }
        Command::Stats { .. } => {
            let s = out.get("stats").cloned().unwrap_or(JsonValue::Null);
            println!("{} {}", "total".bold(), s.get("total").and_then(JsonValue::as_u64).unwrap_or(0));
            if let Some(by) = s.get("by_status").and_then(JsonValue::as_object) {
                for (status, n) in by {
                    let status = if status.is_empty() { "(none)" } else { status.as_str() };
                    println!("  {:<12} {}", status.cyan(), n);
                }
            }
            if let Some(totals) = s.get("currency_totals").and_then(JsonValue::as_object) {
                for (key, sum) in totals {
                    println!("  {:<12} {}", key.yellow(), sum);
                }
            }
        }
        Command::Audit => {
            if let Some(arr) = out.get("events").and_then(JsonValue::as_array) {
                for ev in arr {
                    println!(
                        "{} {} {} {}",
                        str_at(ev, &["ts"]).dimmed(),
                        str_at(ev, &["account_id"]),
                        str_at(ev, &["op"]).bold(),
                        str_at(ev, &["status"]),
                    );
                }
            }
        }
    }
}
