use std::path::PathBuf;

use soa_core::SoaError;
use thiserror::Error;

/// Errors reported by the `soa` command-line tool.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV reader failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A CSV record could not be turned into a row.
    #[error("Line {line}: {message}")]
    Record { line: u64, message: String },

    /// The file does not start with the table magic.
    #[error("{} is not a table file", .0.display())]
    BadMagic(PathBuf),

    /// The file was written by an unknown format version.
    #[error("Unsupported table version {0}")]
    Version(u32),

    /// The file is shorter or longer than its header says.
    #[error("Truncated table file {}", .0.display())]
    Truncated(PathBuf),

    /// The table rejected an operation.
    #[error(transparent)]
    Table(#[from] SoaError),
}

impl CliError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
