//! Table files.
//!
//! Layout, header fields little-endian:
//!
//! ```text
//! magic "SOAT" | version u32 | rows u64 | body length u64 | body
//! ```
//!
//! The body is the table's raw buffer as returned by `HTable::serialize`,
//! so files are only readable on machines with the writer's endianness.

use std::fs;
use std::mem::size_of;
use std::path::Path;

use soa_core::HTable;
use tracing::debug;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::CliError;

/// The table type the tool persists: `u64` keys with `i64` values.
pub type Table = HTable<(u64, i64)>;

/// File magic.
pub const MAGIC: [u8; 4] = *b"SOAT";

/// Current format version.
pub const VERSION: u32 = 1;

/// Fixed-size header at the start of every table file.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct TableFileHeader {
    magic: [u8; 4],
    version: U32,
    rows: U64,
    body_len: U64,
}

const HEADER_LEN: usize = size_of::<TableFileHeader>();

const _: () = assert!(HEADER_LEN == 24);

impl TableFileHeader {
    /// A current-version header for `rows` rows and a body of `body_len`
    /// bytes.
    pub fn new(rows: u64, body_len: u64) -> Self {
        Self {
            magic: MAGIC,
            version: U32::new(VERSION),
            rows: U64::new(rows),
            body_len: U64::new(body_len),
        }
    }

    /// Parses and checks the header at the start of `data`, read from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is shorter than a header, or the magic or
    /// version do not match.
    pub fn from_bytes<'a>(data: &'a [u8], path: &Path) -> Result<&'a Self, CliError> {
        let (header, _) =
            Self::ref_from_prefix(data).map_err(|_| CliError::Truncated(path.to_path_buf()))?;
        if header.magic != MAGIC {
            return Err(CliError::BadMagic(path.to_path_buf()));
        }
        if header.version.get() != VERSION {
            return Err(CliError::Version(header.version.get()));
        }
        Ok(header)
    }

    /// Number of rows in the body.
    pub fn rows(&self) -> u64 {
        self.rows.get()
    }

    /// Byte length of the body.
    pub fn body_len(&self) -> u64 {
        self.body_len.get()
    }
}

/// Serializes `table` into `path`, replacing any existing file.
///
/// # Errors
///
/// Returns an error if serializing or writing fails.
pub fn write_table(table: &mut Table, path: &Path) -> Result<(), CliError> {
    let rows = table.len() as u64;
    let body = table.serialize()?;
    let header = TableFileHeader::new(rows, body.len() as u64);
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(body);
    debug!(path = %path.display(), rows, bytes = out.len(), "writing table");
    fs::write(path, out).map_err(|source| CliError::io(path, source))
}

/// Reads a table written by [`write_table`].
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a table file, or
/// its body does not form a consistent table.
pub fn read_table(path: &Path) -> Result<Table, CliError> {
    let data = fs::read(path).map_err(|source| CliError::io(path, source))?;
    let header = TableFileHeader::from_bytes(&data, path)?;
    let body = &data[HEADER_LEN..];
    if body.len() as u64 != header.body_len() {
        return Err(CliError::Truncated(path.to_path_buf()));
    }
    let rows =
        usize::try_from(header.rows()).map_err(|_| CliError::Truncated(path.to_path_buf()))?;

    let mut table = Table::new();
    table.load(rows, body)?;
    debug!(path = %path.display(), rows, "read table");
    Ok(table)
}
