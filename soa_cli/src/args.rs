use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Build and query persisted hash-indexed column tables
#[derive(Parser, Debug)]
#[command(name = "soa")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a table from a `key,value` CSV file
    Build {
        /// CSV input
        #[arg(short, long)]
        input: PathBuf,
        /// Table file to write
        #[arg(short, long)]
        output: PathBuf,
        /// Treat the first CSV line as a header
        #[arg(long, default_value_t = false)]
        headers: bool,
        /// Store rows ordered by value
        #[arg(long, default_value_t = false)]
        sort_by_value: bool,
    },

    /// Print every value stored under a key
    Get {
        /// Table file
        #[arg(short, long)]
        table: PathBuf,
        key: u64,
    },

    /// Erase rows under a key and rewrite the table
    Erase {
        /// Table file
        #[arg(short, long)]
        table: PathBuf,
        key: u64,
        /// Erase every row under the key instead of one
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Print size and slot statistics
    Stats {
        /// Table file
        #[arg(short, long)]
        table: PathBuf,
    },
}
