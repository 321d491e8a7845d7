//! Struct-of-arrays record storage with an open-addressing hash index.
//!
//! [`Soa`] packs a fixed set of typed columns into one contiguous, 16-byte
//! aligned allocation. [`HTable`] embeds a `Soa` whose first column is the
//! key and keeps a compact slot array of row indices in the same buffer.
//!
//! ```
//! use soa_core::HTable;
//!
//! let mut table: HTable<(String, i32)> = HTable::new();
//! table.insert(("apple".to_string(), 61))?;
//! table.insert(("apple".to_string(), 62))?;
//!
//! let values: Vec<i32> = table.matches("apple").map(|row| *table.at::<1>(row)).collect();
//! assert_eq!(values, [61, 62]);
//! # Ok::<(), soa_core::SoaError>(())
//! ```

pub mod alloc;
pub mod columns;
pub mod constants;
mod error;
pub mod htable;
pub mod store;

pub use columns::{CloneRow, ColumnAt, Columns, PlainRow};
pub use error::{Result, SoaError};
pub use htable::{HTable, ProbeCursor, Slot, SlotState, SlotStats};
pub use store::Soa;
