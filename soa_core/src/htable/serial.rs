//! Raw-buffer persistence of a table, slot array included.
//!
//! Slot positions depend on the hasher, so bytes are only portable between
//! tables whose hasher hashes the same way. The default
//! [`FxBuildHasher`](rustc_hash::FxBuildHasher) is deterministic.

use std::hash::{BuildHasher, Hash};

use contracts::*;

use crate::columns::{ColumnAt, PlainRow};
use crate::error::{Result, SoaError};
use crate::store::Soa;

use super::{HTable, KeyOf};

impl<R, S> HTable<R, S>
where
    R: PlainRow + ColumnAt<0>,
    KeyOf<R>: Hash + Eq,
    S: BuildHasher,
{
    /// Shrinks to the minimal capacity, drops tombstones, and returns the
    /// whole buffer: slot array followed by the columns.
    ///
    /// # Errors
    ///
    /// Returns an error if shrinking fails.
    pub fn serialize(&mut self) -> Result<&[u8]> {
        self.shrink_to_fit()?;
        if self.tombstones > 0 {
            self.rehash();
        }
        Ok(self.store.buffer().as_bytes())
    }

    /// Replaces the contents with `n` rows and returns the buffer for the
    /// caller to overwrite with bytes from [`HTable::serialize`].
    ///
    /// The table is only consistent again once the bytes are in place;
    /// [`HTable::load`] does both steps and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails; the table is then empty.
    pub fn deserialize(&mut self, n: usize) -> Result<&mut [u8]> {
        self.clear();
        let cap = Soa::<R>::aligned(n)?;
        if cap == 0 {
            self.release();
        } else if cap != self.capacity() {
            self.relocate(cap)?;
        }
        // SAFETY: every bit pattern is a valid `PlainRow`, and the buffer is
        // initialized memory.
        unsafe { self.store.set_len(n) };
        Ok(self.store.buffer_mut().as_bytes_mut())
    }

    /// Restores `n` rows and their slot array from bytes produced by
    /// [`HTable::serialize`].
    ///
    /// # Errors
    ///
    /// Returns `SoaError::SizeMismatch` if `bytes` has the wrong length (the
    /// table is unchanged), or `SoaError::IndexCorrupted` if the restored
    /// slot array does not match the rows (the table is left empty).
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
        self.tombstones = self.slots().iter().filter(|slot| slot.is_tombstone()).count();
        if !self.is_consistent() {
            self.clear();
            return Err(SoaError::corrupted(
                "restored slot array does not match its rows",
            ));
        }
        Ok(())
    }

    /// Byte length of a serialized table holding `n` rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the length overflows.
    pub fn serialized_len(n: usize) -> Result<usize> {
        let cap = Soa::<R>::aligned(n)?;
        if cap == 0 {
            return Ok(0);
        }
        Soa::<R>::buffer_len(cap, Self::header_for(Self::slots_for(cap)?)?)
    }
}
