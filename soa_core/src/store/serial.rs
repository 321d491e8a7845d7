//! Raw-buffer persistence.
//!
//! The bytes exposed here are the container's own memory, not a
//! self-describing format. A buffer produced by `serialize` can only be fed
//! back through `deserialize`/`load` of the same row type with the same row
//! count, on a machine with the same endianness.

use contracts::*;

use crate::columns::PlainRow;
use crate::error::{Result, SoaError};

use super::Soa;

impl<R: PlainRow> Soa<R> {
    /// Shrinks to the minimal capacity and returns the whole buffer.
    ///
    /// The length is `row_bytes * align16(len)`, so it depends only on the
    /// row count.
    ///
    /// # Errors
    ///
    /// Returns an error if shrinking fails.
    pub fn serialize(&mut self) -> Result<&[u8]> {
        self.shrink_to_fit()?;
        Ok(self.buffer().as_bytes())
    }

    /// Replaces the contents with `n` rows and returns the buffer for the
    /// caller to overwrite with bytes from [`Soa::serialize`].
    ///
    /// The capacity is set to exactly the minimal capacity for `n` rows, so
    /// the returned slice has the same length `serialize` produced.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails; the store is then empty.
    pub fn deserialize(&mut self, n: usize) -> Result<&mut [u8]> {
        self.reshape_exact(n)?;
        // SAFETY: every bit pattern is a valid `PlainRow`, and the buffer is
        // initialized memory.
        unsafe { self.set_len(n) };
        Ok(self.buffer_mut().as_bytes_mut())
    }

    /// Restores `n` rows from bytes produced by [`Soa::serialize`].
    ///
    /// # Errors
    ///
    /// Returns `SoaError::SizeMismatch` if `bytes` has the wrong length, in
    /// which case the store is unchanged.
    #[debug_ensures(ret.is_ok() -> self.len() == n)]
    pub fn load(&mut self, n: usize, bytes: &[u8]) -> Result<()> {
        let expected = Self::serialized_len(n)?;
        if bytes.len() != expected {
            return Err(SoaError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        self.deserialize(n)?.copy_from_slice(bytes);
        Ok(())
    }

    /// Byte length of a serialized store holding `n` rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the length overflows.
    pub fn serialized_len(n: usize) -> Result<usize> {
        Self::buffer_len(Self::aligned(n)?, 0)
    }

    /// The current buffer, without shrinking first.
    pub fn raw_bytes(&self) -> &[u8] {
        self.buffer().as_bytes()
    }

    /// Drops all rows and makes the capacity exactly `align16(n)`.
    fn reshape_exact(&mut self, n: usize) -> Result<()> {
        self.clear();
        let cap = Self::aligned(n)?;
        if cap == self.capacity() && self.header_len() == 0 {
            return Ok(());
        }
        if cap == 0 {
            self.release();
            return Ok(());
        }
        self.relocate(cap, 0)
    }
}
