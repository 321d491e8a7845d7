//! Error types for container operations.
//!
//! Allocation failure is the only error a well-behaved caller can hit.
//! Every capacity-affecting operation checks it before touching the old
//! buffer, so an `Err` always leaves the container in its previous state.

use std::alloc::Layout;

use thiserror::Error;

/// Result type alias using `SoaError`.
pub type Result<T> = std::result::Result<T, SoaError>;

/// Errors that can occur in store or index operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SoaError {
    /// The allocator returned null.
    #[error("Allocation of {} bytes failed", .layout.size())]
    AllocFailed { layout: Layout },

    /// The requested capacity does not fit in the address space.
    #[error("Capacity overflow: {requested} rows of {row_bytes} bytes")]
    CapacityOverflow { requested: usize, row_bytes: usize },

    /// The index cannot address any more rows.
    #[error("Table full: at most {max} rows")]
    TableFull { max: usize },

    /// A row index was past the end of the container.
    #[error("Row {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    /// A column element needs stricter alignment than the buffer provides.
    #[error("Column alignment {align} exceeds buffer alignment {max}")]
    UnsupportedAlignment { align: usize, max: usize },

    /// Raw bytes handed to `load` do not match the buffer geometry.
    #[error("Buffer length mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A slot could not be linked back to its row.
    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),
}

impl SoaError {
    /// Create an index corruption error.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::IndexCorrupted(msg.into())
    }

    /// Diverges the way std collections do when an infallible API runs out
    /// of memory.
    pub(crate) fn abort(self) -> ! {
        match self {
            Self::AllocFailed { layout } => std::alloc::handle_alloc_error(layout),
            other => panic!("{other}"),
        }
    }
}
