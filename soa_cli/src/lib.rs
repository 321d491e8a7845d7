//! Command-line front end over a persisted `HTable<(u64, i64)>`.
//!
//! Tables are built from `key,value` CSV files and stored as one framed
//! file holding the table's raw buffer.

mod commands;
mod error;
pub mod persist;

pub use commands::{build, erase, lookup, read_rows, stats};
pub use error::CliError;
pub use persist::{Table, read_table, write_table};
