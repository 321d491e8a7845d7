//! `soa` command-line tool.

#[cfg(feature = "jemalloc")]
#[global_allocator]
/// Global allocator using jemalloc.
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod args;

use clap::Parser;
use soa_cli::{build, erase, lookup, read_table, stats};

use args::{Args, Command};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Build {
            input,
            output,
            headers,
            sort_by_value,
        } => {
            let table = build(&input, &output, headers, sort_by_value)?;
            println!("wrote {} rows to {}", table.len(), output.display());
        }
        Command::Get { table, key } => {
            let table = read_table(&table)?;
            for value in lookup(&table, key) {
                println!("{value}");
            }
        }
        Command::Erase { table, key, all } => {
            let erased = erase(&table, key, all)?;
            println!("erased {erased} rows");
        }
        Command::Stats { table } => {
            let table = read_table(&table)?;
            println!("{}", stats(&table));
        }
    }
    Ok(())
}
