use std::path::Path;

use tracing::{debug, info};

use crate::error::CliError;
use crate::persist::{Table, read_table, write_table};

/// Reads `key,value` rows from a CSV file. Blank lines and lines starting
/// with `#` are skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a record is malformed.
pub fn read_rows(input: &Path, has_headers: bool) -> Result<Vec<(u64, i64)>, CliError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(input)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, csv::Position::line);
        if record.len() != 2 {
            return Err(CliError::Record {
                line,
                message: format!("expected 2 fields, found {}", record.len()),
            });
        }
        let key = record[0].parse::<u64>().map_err(|e| CliError::Record {
            line,
            message: format!("bad key {:?}: {e}", &record[0]),
        })?;
        let value = record[1].parse::<i64>().map_err(|e| CliError::Record {
            line,
            message: format!("bad value {:?}: {e}", &record[1]),
        })?;
        rows.push((key, value));
    }
    debug!(input = %input.display(), rows = rows.len(), "read csv");
    Ok(rows)
}

/// Builds a table from a CSV file and writes it to `output`. Returns the
/// table as written.
///
/// # Errors
///
/// Returns an error if reading, inserting or writing fails.
pub fn build(
    input: &Path,
    output: &Path,
    has_headers: bool,
    sort_by_value: bool,
) -> Result<Table, CliError> {
    let rows = read_rows(input, has_headers)?;
    let mut table = Table::from_rows(rows)?;
    if sort_by_value {
        let swaps = table.sort::<1>();
        debug!(swaps, "sorted by value");
    }
    write_table(&mut table, output)?;
    info!(rows = table.len(), output = %output.display(), "built table");
    Ok(table)
}

/// Every value stored under `key`, in probe order.
pub fn lookup(table: &Table, key: u64) -> Vec<i64> {
    table.matches(&key).map(|row| *table.at::<1>(row)).collect()
}

/// Erases one row (or every row, with `all`) under `key` from the table file
/// and rewrites it. Returns the number of rows erased.
///
/// # Errors
///
/// Returns an error if the file cannot be read or rewritten.
pub fn erase(path: &Path, key: u64, all: bool) -> Result<usize, CliError> {
    let mut table = read_table(path)?;
    let erased = if all {
        table.erase_all(&key)?
    } else {
        table.erase(&key)?
    };
    if erased > 0 {
        write_table(&mut table, path)?;
    }
    info!(key, erased, "erased rows");
    Ok(erased)
}

/// Human-readable summary of a table.
pub fn stats(table: &Table) -> String {
    format!(
        "rows:      {}\ncapacity:  {}\nbytes:     {}\nslots:     {}",
        table.len(),
        table.capacity(),
        table.store().raw_bytes().len(),
        table.slot_stats(),
    )
}
