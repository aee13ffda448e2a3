//! Core modules: store handle, configuration, logging and the SQLite plumbing
//! every engine operation goes through.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pool;
pub mod schemas;
pub mod store;
pub mod time;
