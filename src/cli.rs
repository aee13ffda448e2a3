//! CLI struct definitions for the recordforge command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use crate::engine::field_types::FieldType;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(
    name = "recordforge",
    version = env!("CARGO_PKG_VERSION"),
    about = "Runtime-defined modules, typed fields and validated records on SQLite."
)]
pub(crate) struct Cli {
    /// Store directory holding the database, config and audit log.
    #[clap(long, global = true, default_value = ".recordforge")]
    pub root: PathBuf,
    /// Authenticated account id. Commands fail with `unauthorized` without one.
    #[clap(long, global = true, env = "RECORDFORGE_USER")]
    pub user: Option<String>,
    /// Output format.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create, list and inspect modules.
    #[clap(subcommand)]
    Module(ModuleCommand),
    /// Manage a module's fields.
    #[clap(subcommand)]
    Field(FieldCommand),
    /// Create, read, update and delete records.
    #[clap(subcommand)]
    Record(RecordCommand),
    /// Drive the field designer from the command line.
    #[clap(subcommand)]
    Designer(DesignerCommandCli),
    /// Create the Clients module from the legacy client table (idempotent).
    Bootstrap,
    /// Write rows into the legacy client table.
    #[clap(subcommand)]
    Legacy(LegacyCommand),
    /// Dashboard aggregates for a module.
    Stats {
        module_id: String,
    },
    /// Show the broker audit log.
    Audit,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ModuleCommand {
    Create {
        name: String,
    },
    List,
    Show {
        module_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum FieldCommand {
    /// Append a field to a module.
    Add {
        module_id: String,
        #[clap(long = "type", value_enum)]
        field_type: FieldType,
        /// Explicit key; generated when omitted.
        #[clap(long)]
        key: Option<String>,
        #[clap(long)]
        label: Option<String>,
        #[clap(long)]
        required: bool,
        #[clap(long)]
        unique: bool,
        /// Comma-separated choices for select/multiselect.
        #[clap(long, value_delimiter = ',')]
        choices: Vec<String>,
        /// Default value as JSON (e.g. '"lead"' or '0').
        #[clap(long)]
        default: Option<String>,
        #[clap(long)]
        span: Option<u8>,
    },
    List {
        module_id: String,
    },
    /// Change properties of one field.
    Edit {
        field_id: String,
        #[clap(long)]
        label: Option<String>,
        #[clap(long = "type", value_enum)]
        field_type: Option<FieldType>,
        #[clap(long)]
        placeholder: Option<String>,
        #[clap(long)]
        help_text: Option<String>,
        #[clap(long)]
        required: Option<bool>,
        #[clap(long)]
        unique: Option<bool>,
        #[clap(long, value_delimiter = ',')]
        choices: Option<Vec<String>>,
        /// Default value as JSON; `null` clears it.
        #[clap(long)]
        default: Option<String>,
        #[clap(long)]
        span: Option<u8>,
    },
    Delete {
        field_id: String,
    },
    /// Replace the whole field order.
    Reorder {
        module_id: String,
        #[clap(required = true)]
        field_ids: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum RecordCommand {
    Add {
        module_id: String,
        /// Values as a JSON object keyed by field key.
        #[clap(long, default_value = "{}")]
        data: String,
    },
    Get {
        record_id: String,
    },
    List {
        module_id: String,
        /// Case-insensitive substring filter on the display field.
        #[clap(long)]
        query: Option<String>,
        /// Field key to filter on instead of the first text field.
        #[clap(long)]
        on: Option<String>,
    },
    /// Merge values into an existing record.
    Edit {
        record_id: String,
        #[clap(long)]
        data: String,
    },
    Delete {
        record_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum DesignerCommandCli {
    /// List the field types that can be dropped on the canvas.
    Palette,
    /// Drop a palette item at a canvas index.
    Drop {
        module_id: String,
        #[clap(long = "type", value_enum)]
        field_type: FieldType,
        #[clap(long)]
        at: Option<usize>,
    },
    /// Drag a field from one canvas index to another.
    Move {
        module_id: String,
        #[clap(long)]
        from: usize,
        #[clap(long)]
        to: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum LegacyCommand {
    Add {
        name: String,
        #[clap(long)]
        email: Option<String>,
        #[clap(long)]
        phone: Option<String>,
        #[clap(long)]
        company: Option<String>,
        #[clap(long)]
        status: Option<String>,
        #[clap(long)]
        contract_value: Option<f64>,
        #[clap(long)]
        website: Option<String>,
        #[clap(long)]
        notes: Option<String>,
    },
}
