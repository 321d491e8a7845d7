//! Open-addressing hash index over a [`Soa`].
//!
//! The first column of the row type is the key. The slot array lives in the
//! header region of the store's own buffer, in front of column 0, so one
//! allocation holds both the rows and the index:
//!
//! ```text
//! [ slot 0 .. slot 2*cap+2 | pad ][ keys × cap ][ col 1 × cap ] ...
//! ```
//!
//! Each slot is a `u32` row index or one of the [`Slot`] sentinels. Probing
//! starts at `hash(key) % slot_capacity` and advances by
//! [`PROBE_STRIDE`](crate::constants::PROBE_STRIDE) modulo the (odd) slot
//! capacity, so every slot is visited once per cycle. Duplicate keys are
//! allowed and are found in probe order.

mod cursor;
mod serial;
mod slot;
mod stats;

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::mem::size_of;
use std::slice;

use contracts::*;
use rustc_hash::FxBuildHasher;
use tracing::{debug, trace, warn};

use crate::columns::{CloneRow, ColumnAt, Columns};
use crate::constants::{MIN_CAPACITY, PROBE_STRIDE};
use crate::error::{Result, SoaError};
use crate::store::Soa;

pub use cursor::ProbeCursor;
pub use slot::{Slot, SlotState};
pub use stats::SlotStats;

/// Key type of a row type: its first column.
pub type KeyOf<R> = <R as ColumnAt<0>>::Elem;

/// A columnar store indexed by its first column.
///
/// Rows keep the dense, unordered layout of [`Soa`]; removal moves the last
/// row into the hole, so row indices are only stable until the next erase,
/// sort or swap.
pub struct HTable<R: Columns, S = FxBuildHasher> {
    store: Soa<R>,
    /// Number of slots; `2 * capacity + 3`, or 0 while unallocated.
    slot_cap: usize,
    /// Position of the last successful `find`.
    cursor: ProbeCursor,
    /// Tombstones currently in the slot array.
    tombstones: usize,
    hasher: S,
}

impl<R: Columns> HTable<R> {
    /// Creates an empty table with the default hasher. Does not allocate.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_hasher(FxBuildHasher)
    }

    /// Creates an empty table able to hold `n` rows without reallocating.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails.
    pub fn with_capacity(n: usize) -> Result<Self> {
        Self::with_capacity_and_hasher(n, FxBuildHasher)
    }
}

impl<R: Columns, S> HTable<R, S> {
    /// Creates an empty table hashing keys with `hasher`.
    pub const fn with_hasher(hasher: S) -> Self {
        Self {
            store: Soa::new(),
            slot_cap: 0,
            cursor: ProbeCursor::new(),
            tombstones: 0,
            hasher,
        }
    }

    /// Creates an empty table with room for `n` rows, hashing with `hasher`.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails.
    pub fn with_capacity_and_hasher(n: usize, hasher: S) -> Result<Self> {
        let mut table = Self::with_hasher(hasher);
        table.grow_to(n)?;
        Ok(table)
    }

    /// Number of rows.
    #[inline]
    pub const fn len(&self) -> usize {
        self.store.len()
    }

    /// True if the table holds no rows.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Row capacity.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Number of slots in the probe array.
    #[inline]
    pub const fn slot_capacity(&self) -> usize {
        self.slot_cap
    }

    /// Number of tombstones in the probe array.
    #[inline]
    pub const fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Largest number of rows the table can hold.
    ///
    /// Bounded by the slot encoding as well as by the address space.
    pub const fn max_size(&self) -> usize {
        let store_max = self.store.max_size();
        if store_max < Slot::MAX_ROWS {
            store_max
        } else {
            Slot::MAX_ROWS
        }
    }

    /// The hasher.
    pub const fn hasher(&self) -> &S {
        &self.hasher
    }

    /// The underlying store, read-only.
    #[inline]
    pub const fn store(&self) -> &Soa<R> {
        &self.store
    }

    /// Element `i` of column `K`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len`.
    #[inline]
    pub fn at<const K: usize>(&self, i: usize) -> &<R as ColumnAt<K>>::Elem
    where
        R: ColumnAt<K>,
    {
        self.store.at::<K>(i)
    }

    /// Mutable element `i` of a non-key column `K`.
    ///
    /// Keys cannot be edited in place; erase and re-insert instead.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len`.
    #[inline]
    pub fn at_mut<const K: usize>(&mut self, i: usize) -> &mut <R as ColumnAt<K>>::Elem
    where
        R: ColumnAt<K>,
    {
        const { assert!(K != 0, "the key column cannot be borrowed mutably") };
        self.store.at_mut::<K>(i)
    }

    /// Element `i` of column `K`, or `None` if out of bounds.
    #[inline]
    pub fn get_at<const K: usize>(&self, i: usize) -> Option<&<R as ColumnAt<K>>::Elem>
    where
        R: ColumnAt<K>,
    {
        self.store.get::<K>(i)
    }

    /// Column `K` as a slice of `len` elements.
    #[inline]
    pub fn column<const K: usize>(&self) -> &[<R as ColumnAt<K>>::Elem]
    where
        R: ColumnAt<K>,
    {
        self.store.column::<K>()
    }

    /// A non-key column `K` as a mutable slice.
    #[inline]
    pub fn column_mut<const K: usize>(&mut self) -> &mut [<R as ColumnAt<K>>::Elem]
    where
        R: ColumnAt<K>,
    {
        const { assert!(K != 0, "the key column cannot be borrowed mutably") };
        self.store.column_mut::<K>()
    }

    /// Row `i` as a tuple of references.
    #[inline]
    pub fn row(&self, i: usize) -> Option<R::Ref<'_>> {
        self.store.row(i)
    }

    /// Iterates over rows in storage order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = R::Ref<'_>> + '_ {
        self.store.rows()
    }

    /// The slot array, for inspection.
    pub fn slot_map(&self) -> &[Slot] {
        self.slots()
    }

    /// Occupancy statistics of the slot array.
    pub fn slot_stats(&self) -> SlotStats {
        SlotStats::collect(self.slots())
    }

    // =========================================================================
    // Slot array
    // =========================================================================

    #[inline]
    fn slots(&self) -> &[Slot] {
        if self.slot_cap == 0 {
            return &[];
        }
        // SAFETY: the header holds `slot_cap` initialized, 16-aligned `u32`s
        // whenever `slot_cap > 0`.
        unsafe { slice::from_raw_parts(self.store.header_ptr().cast::<Slot>(), self.slot_cap) }
    }

    #[inline]
    fn slots_mut(&mut self) -> &mut [Slot] {
        if self.slot_cap == 0 {
            return &mut [];
        }
        // SAFETY: as for `slots`, with exclusive access through `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.store.header_ptr().cast::<Slot>(), self.slot_cap) }
    }

    #[inline]
    const fn step(&self, pos: usize) -> usize {
        (pos + PROBE_STRIDE) % self.slot_cap
    }

    /// Slot count for a row capacity: `2 * cap + 3`, always odd.
    fn slots_for(cap: usize) -> Result<usize> {
        cap.checked_mul(2)
            .and_then(|n| n.checked_add(3))
            .ok_or(SoaError::CapacityOverflow {
                requested: cap,
                row_bytes: R::ROW_BYTES,
            })
    }

    /// Header bytes holding `slots` slots, padded to a multiple of 16.
    ///
    /// `slots + 1` slots of 4 bytes, i.e. `8 * cap + 16` bytes.
    fn header_for(slots: usize) -> Result<usize> {
        (slots + 1)
            .checked_mul(size_of::<Slot>())
            .ok_or(SoaError::CapacityOverflow {
                requested: slots,
                row_bytes: R::ROW_BYTES,
            })
    }

    /// Reserves room for `n` rows without rebuilding the slot array.
    /// Only used while the table is empty.
    fn grow_to(&mut self, n: usize) -> Result<()> {
        debug_assert!(self.is_empty());
        let cap = Soa::<R>::target_capacity(n)?;
        if cap <= self.capacity() {
            return Ok(());
        }
        self.relocate(cap)?;
        self.slots_mut().fill(Slot::EMPTY);
        Ok(())
    }

    /// Moves the rows into a buffer of `cap` rows with a fresh, zeroed slot
    /// array. The caller rebuilds the slots.
    fn relocate(&mut self, cap: usize) -> Result<()> {
        let slot_cap = Self::slots_for(cap)?;
        let header = Self::header_for(slot_cap)?;
        self.store.relocate(cap, header)?;
        debug!(capacity = cap, slot_capacity = slot_cap, "resized slot array");
        self.slot_cap = slot_cap;
        self.cursor.clear();
        self.tombstones = 0;
        Ok(())
    }

    /// Frees the buffer. Only valid while empty.
    fn release(&mut self) {
        self.store.release();
        self.slot_cap = 0;
        self.cursor.clear();
        self.tombstones = 0;
    }
}

impl<R, S> HTable<R, S>
where
    R: ColumnAt<0>,
    KeyOf<R>: Hash + Eq,
    S: BuildHasher,
{
    /// Builds a table from a sequence of rows, inserted in order.
    ///
    /// # Errors
    ///
    /// Returns an error if an allocation fails.
    pub fn from_rows<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        S: Default,
    {
        let rows = rows.into_iter();
        let mut table = Self::with_hasher(S::default());
        let (lower, _) = rows.size_hint();
        if lower > 0 {
            table.reserve(lower)?;
        }
        for row in rows {
            table.insert(row)?;
        }
        Ok(table)
    }

    /// Clones every row and the slot array into a new table with the same
    /// capacity, so row indices and probe order carry over.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails.
    pub fn try_clone(&self) -> Result<Self>
    where
        R: CloneRow,
        S: Clone,
    {
        let mut table = Self::with_hasher(self.hasher.clone());
        if self.capacity() == 0 {
            return Ok(table);
        }
        table.relocate(self.capacity())?;
        for i in 0..self.len() {
            if let Some(row) = self.store.clone_row(i) {
                table.store.push(row)?;
            }
        }
        table.slots_mut().copy_from_slice(self.slots());
        table.tombstones = self.tombstones;
        Ok(table)
    }

    // =========================================================================
    // Capacity
    // =========================================================================

    /// Ensures room for at least `n` rows, rounding up to a multiple of 16
    /// (minimum 16). Never shrinks. Growing rebuilds the slot array.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails; the table is unchanged.
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        let cap = Soa::<R>::target_capacity(n)?;
        if cap <= self.capacity() {
            return Ok(());
        }
        self.relocate(cap)?;
        self.rehash();
        Ok(())
    }

    /// Reduces the capacity to `align16(len)`, releasing the buffer when
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails; the table is unchanged.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        let cap = Soa::<R>::aligned(self.len())?;
        if cap == self.capacity() {
            return Ok(());
        }
        if cap == 0 {
            self.release();
            return Ok(());
        }
        self.relocate(cap)?;
        self.rehash();
        Ok(())
    }

    /// Drops every row and empties the slot array. Keeps the capacity.
    pub fn clear(&mut self) {
        self.store.clear();
        self.slots_mut().fill(Slot::EMPTY);
        self.cursor.clear();
        self.tombstones = 0;
    }

    // =========================================================================
    // Hashing and probing
    // =========================================================================

    #[inline]
    fn bucket<Q>(&self, key: &Q) -> usize
    where
        Q: Hash + ?Sized,
    {
        debug_assert!(self.slot_cap > 0);
        (self.hasher.hash_one(key) % self.slot_cap as u64) as usize
    }

    /// Walks at most `budget` slots from `pos` and returns the first slot
    /// whose row matches `key`, with the number of steps taken to reach it.
    fn scan<Q>(&self, key: &Q, mut pos: usize, budget: usize) -> Option<(usize, usize, usize)>
    where
        KeyOf<R>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slots = self.slots();
        let keys = self.store.column::<0>();
        for taken in 0..budget {
            match slots[pos].state() {
                SlotState::Empty => return None,
                SlotState::Row(row) => {
                    if keys
                        .get(row)
                        .is_some_and(|k| <KeyOf<R> as Borrow<Q>>::borrow(k) == key)
                    {
                        return Some((pos, row, taken));
                    }
                }
                SlotState::Tombstone => {}
            }
            pos = self.step(pos);
        }
        None
    }

    /// First empty or tombstone slot on the probe path of `key`.
    fn vacant_slot(&self, key: &KeyOf<R>) -> Result<usize> {
        let slots = self.slots();
        let mut pos = self.bucket(key);
        for _ in 0..self.slot_cap {
            if !matches!(slots[pos].state(), SlotState::Row(_)) {
                return Ok(pos);
            }
            pos = self.step(pos);
        }
        Err(SoaError::corrupted("no vacant slot on the probe path"))
    }

    /// The slot that refers to row `row`.
    fn slot_of(&self, row: usize) -> Result<usize> {
        let slots = self.slots();
        let mut pos = self.bucket(self.store.at::<0>(row));
        for _ in 0..self.slot_cap {
            match slots[pos].state() {
                SlotState::Row(found) if found == row => return Ok(pos),
                SlotState::Empty => break,
                _ => {}
            }
            pos = self.step(pos);
        }
        warn!(row, "row is not reachable from its bucket");
        Err(SoaError::corrupted(format!(
            "row {row} is not reachable from its bucket"
        )))
    }

    /// Drops tombstones and re-links every row from scratch.
    #[debug_ensures(self.tombstones == 0 && self.cursor.position().is_none())]
    pub fn rehash(&mut self) {
        self.cursor.clear();
        self.tombstones = 0;
        if self.slot_cap == 0 {
            return;
        }
        self.slots_mut().fill(Slot::EMPTY);
        for row in 0..self.len() {
            let mut pos = self.bucket(self.store.at::<0>(row));
            while !self.slots()[pos].is_empty() {
                pos = self.step(pos);
            }
            self.slots_mut()[pos] = Slot::row(row);
        }
        trace!(rows = self.len(), slots = self.slot_cap, "rehashed");
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Appends `row` and links it under its key. Duplicate keys are kept.
    /// Returns the new row index.
    ///
    /// Doubles the capacity when full (minimum 16), and rebuilds the slot
    /// array first when tombstones exceed half the row capacity.
    ///
    /// # Errors
    ///
    /// Returns `SoaError::TableFull` at [`HTable::max_size`], or an
    /// allocation error; the table is unchanged in both cases.
    #[debug_ensures(ret.as_ref().map(|&index| index + 1 == self.len()).unwrap_or(true))]
    pub fn insert(&mut self, row: R) -> Result<usize> {
        let index = self.make_room()?;
        let pos = self.vacant_slot(<R as ColumnAt<0>>::field(&row))?;
        if self.slots()[pos].is_tombstone() {
            self.tombstones -= 1;
            // The cursor may still sit on this tombstone after `remove_found`.
            if self.cursor.position() == Some(pos) {
                self.cursor.clear();
            }
        }
        self.slots_mut()[pos] = Slot::row(index);
        // SAFETY: `make_room` left `len < capacity`.
        unsafe { self.store.write_unchecked(row) };
        Ok(index)
    }

    /// Inserts `row` at its sorted position by column `K` and rebuilds the
    /// slot array. Returns the row's index.
    ///
    /// # Errors
    ///
    /// As for [`HTable::insert`].
    #[debug_ensures(ret.is_err() || self.len() <= self.capacity())]
    pub fn insert_sorted<const K: usize>(&mut self, row: R) -> Result<usize>
    where
        R: ColumnAt<K>,
        <R as ColumnAt<K>>::Elem: PartialOrd,
    {
        self.make_room()?;
        let at = self.store.insert_sorted::<K>(row)?;
        self.rehash();
        Ok(at)
    }

    /// Guarantees room for one more row and returns its index.
    fn make_room(&mut self) -> Result<usize> {
        let index = self.len();
        if index >= self.max_size() {
            return Err(SoaError::TableFull {
                max: self.max_size(),
            });
        }
        if index == self.capacity() {
            let doubled = self.capacity().checked_mul(2).ok_or(SoaError::CapacityOverflow {
                requested: self.capacity(),
                row_bytes: R::ROW_BYTES,
            })?;
            self.reserve(doubled.max(MIN_CAPACITY))?;
        } else if self.tombstones > self.capacity() / 2 {
            self.rehash();
        }
        Ok(index)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Finds a row whose key equals `key`.
    ///
    /// With `restart`, the probe starts at the key's bucket. Without it, the
    /// probe resumes one step past the previous successful `find`, so
    /// repeated calls enumerate every duplicate in probe order. Returns
    /// `None` once the probe reaches an empty slot; a miss also resets the
    /// cursor, so later resumed calls return `None` too.
    pub fn find<Q>(&mut self, key: &Q, restart: bool) -> Option<usize>
    where
        KeyOf<R>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut cursor = self.cursor;
        let found = self.find_with(key, restart, &mut cursor);
        self.cursor = cursor;
        found
    }

    /// [`HTable::find`] with a caller-owned cursor, for shared access.
    pub fn find_with<Q>(&self, key: &Q, restart: bool, cursor: &mut ProbeCursor) -> Option<usize>
    where
        KeyOf<R>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.is_empty() {
            cursor.clear();
            return None;
        }
        let (start, steps) = if restart {
            (self.bucket(key), 0)
        } else {
            match cursor.position() {
                Some(pos) if pos < self.slot_cap => (self.step(pos), cursor.steps() + 1),
                _ => {
                    cursor.clear();
                    return None;
                }
            }
        };
        match self.scan(key, start, self.slot_cap.saturating_sub(steps)) {
            Some((pos, row, taken)) => {
                cursor.set(pos, steps + taken);
                Some(row)
            }
            None => {
                cursor.clear();
                None
            }
        }
    }

    /// Index of the first row found under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<usize>
    where
        KeyOf<R>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find_with(key, true, &mut ProbeCursor::new())
    }

    /// True if any row has key `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        KeyOf<R>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Every row index under `key`, in probe order.
    pub fn matches<'a, Q>(&'a self, key: &'a Q) -> impl Iterator<Item = usize> + 'a
    where
        KeyOf<R>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut cursor = ProbeCursor::new();
        let mut restart = true;
        std::iter::from_fn(move || {
            let found = self.find_with(key, restart, &mut cursor);
            restart = false;
            found
        })
    }

    /// Number of rows under `key`.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        KeyOf<R>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.matches(key).count()
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Row and slot under the cursor, if the last `find` succeeded.
    fn found(&self) -> Result<Option<(usize, usize)>> {
        let Some(pos) = self.cursor.position().filter(|&pos| pos < self.slot_cap) else {
            return Ok(None);
        };
        let SlotState::Row(index) = self.slots()[pos].state() else {
            return Ok(None);
        };
        if index >= self.len() {
            return Err(SoaError::corrupted(format!(
                "slot {pos} refers to row {index} past the end ({})",
                self.len()
            )));
        }
        Ok(Some((pos, index)))
    }

    /// Removes the row located by the last successful `find` and returns it.
    ///
    /// The last row moves into the hole and its slot is re-pointed; the
    /// removed slot becomes a tombstone, so `find(key, false)` continues
    /// with the next duplicate.
    ///
    /// # Errors
    ///
    /// Returns `SoaError::IndexCorrupted` if the moved row cannot be found in
    /// the slot array; nothing is removed in that case.
    #[debug_ensures(self.tombstones <= self.slot_cap)]
    pub fn remove_found(&mut self) -> Result<Option<R>> {
        let Some((pos, index)) = self.found()? else {
            return Ok(None);
        };
        let last = self.len() - 1;
        let moved = if index == last {
            None
        } else {
            Some(self.slot_of(last)?)
        };
        let removed = self
            .store
            .erase_swap(index)
            .ok_or(SoaError::OutOfBounds {
                index,
                len: self.len(),
            })?;
        let slots = self.slots_mut();
        slots[pos] = Slot::TOMBSTONE;
        if let Some(moved) = moved {
            slots[moved] = Slot::row(index);
        }
        self.tombstones += 1;
        Ok(Some(removed))
    }

    /// Erases the row located by the last successful `find`. Returns the
    /// number of rows erased (0 or 1).
    ///
    /// # Errors
    ///
    /// As for [`HTable::remove_found`].
    pub fn erase_found(&mut self) -> Result<usize> {
        Ok(usize::from(self.remove_found()?.is_some()))
    }

    /// Erases one row under `key`. Returns the number of rows erased.
    ///
    /// # Errors
    ///
    /// As for [`HTable::remove_found`].
    pub fn erase<Q>(&mut self, key: &Q) -> Result<usize>
    where
        KeyOf<R>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key, true);
        self.erase_found()
    }

    /// Erases every row under `key`. Returns the number of rows erased.
    ///
    /// # Errors
    ///
    /// As for [`HTable::remove_found`].
    pub fn erase_all<Q>(&mut self, key: &Q) -> Result<usize>
    where
        KeyOf<R>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut erased = 0;
        let mut found = self.find(key, true);
        while found.is_some() {
            erased += self.erase_found()?;
            found = self.find(key, false);
        }
        Ok(erased)
    }

    /// Removes the row located by the last successful `find`, shifting later
    /// rows down to keep their order, then rebuilds the slot array.
    ///
    /// The cursor is reset by the rebuild.
    ///
    /// # Errors
    ///
    /// Returns `SoaError::IndexCorrupted` if the cursor's slot refers to a
    /// row past the end.
    pub fn remove_found_sorted(&mut self) -> Result<Option<R>> {
        let Some((_, index)) = self.found()? else {
            return Ok(None);
        };
        let removed = self.store.erase_shift(index);
        self.rehash();
        Ok(removed)
    }

    /// [`HTable::remove_found_sorted`], returning the number of rows erased.
    ///
    /// # Errors
    ///
    /// As for [`HTable::remove_found_sorted`].
    pub fn erase_found_sorted(&mut self) -> Result<usize> {
        Ok(usize::from(self.remove_found_sorted()?.is_some()))
    }

    /// Erases one row under `key`, preserving row order.
    ///
    /// # Errors
    ///
    /// As for [`HTable::remove_found_sorted`].
    pub fn erase_sorted<Q>(&mut self, key: &Q) -> Result<usize>
    where
        KeyOf<R>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key, true);
        self.erase_found_sorted()
    }

    // =========================================================================
    // Reordering
    // =========================================================================

    /// Swaps rows `a` and `b` and re-points their slots.
    ///
    /// Both slots are located before anything moves.
    ///
    /// # Errors
    ///
    /// Returns `SoaError::OutOfBounds` for a bad index, or
    /// `SoaError::IndexCorrupted` if either row is missing from the slot
    /// array. The table is unchanged on error.
    #[debug_ensures(self.len() <= self.capacity())]
    pub fn swap_rows(&mut self, a: usize, b: usize) -> Result<()> {
        for index in [a, b] {
            if index >= self.len() {
                return Err(SoaError::OutOfBounds {
                    index,
                    len: self.len(),
                });
            }
        }
        if a == b {
            return Ok(());
        }
        let slot_a = self.slot_of(a)?;
        let slot_b = self.slot_of(b)?;
        self.store.swap_rows(a, b)?;
        let slots = self.slots_mut();
        slots[slot_a] = Slot::row(b);
        slots[slot_b] = Slot::row(a);
        Ok(())
    }

    /// Sorts rows by column `K`, rebuilds the slot array, and returns the
    /// number of row swaps.
    pub fn sort<const K: usize>(&mut self) -> usize
    where
        R: ColumnAt<K>,
        <R as ColumnAt<K>>::Elem: PartialOrd,
    {
        let swaps = self.store.sort::<K>();
        self.rehash();
        swaps
    }

    // =========================================================================
    // Consistency
    // =========================================================================

    /// Checks that every live row is referenced by exactly one slot on its
    /// probe path, that no slot refers past the end, and that the tombstone
    /// count is accurate.
    pub fn is_consistent(&self) -> bool {
        if !self.store.is_valid_state() {
            return false;
        }
        if self.slot_cap == 0 {
            return self.is_empty() && self.tombstones == 0;
        }
        let mut seen = vec![false; self.len()];
        let mut tombstones = 0;
        for slot in self.slots() {
            match slot.state() {
                SlotState::Empty => {}
                SlotState::Tombstone => tombstones += 1,
                SlotState::Row(row) => match seen.get_mut(row) {
                    Some(seen) if !*seen => *seen = true,
                    _ => return false,
                },
            }
        }
        tombstones == self.tombstones
            && seen.iter().all(|&seen| seen)
            && (0..self.len()).all(|row| self.slot_of(row).is_ok())
    }
}

impl<R: Columns, S: Default> Default for HTable<R, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<R, S> Clone for HTable<R, S>
where
    R: CloneRow + ColumnAt<0>,
    KeyOf<R>: Hash + Eq,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        self.try_clone().unwrap_or_else(|err| err.abort())
    }
}

impl<R: Columns, S> fmt::Debug for HTable<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("slot_capacity", &self.slot_cap)
            .field("tombstones", &self.tombstones)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    type Table = HTable<(u32, i64)>;

    fn filled(n: u32) -> Table {
        let mut table = Table::new();
        for i in 0..n {
            table.insert((i, i64::from(i) * 10)).unwrap();
        }
        table
    }

    #[test]
    fn test_new_is_unallocated() {
        let table = Table::new();
        assert_eq!(table.len(), 0);
        assert_eq!(table.capacity(), 0);
        assert_eq!(table.slot_capacity(), 0);
        assert!(table.slot_map().is_empty());
        assert!(table.is_consistent());
    }

    #[rstest]
    #[case(1, 16, 35)]
    #[case(16, 16, 35)]
    #[case(17, 32, 67)]
    #[case(100, 112, 227)]
    fn test_slot_capacity_follows_rows(
        #[case] request: usize,
        #[case] capacity: usize,
        #[case] slots: usize,
    ) {
        let table = Table::with_capacity(request).unwrap();
        assert_eq!(table.capacity(), capacity);
        assert_eq!(table.slot_capacity(), slots);
        assert!(table.slot_map().iter().all(|slot| slot.is_empty()));
    }

    #[test]
    fn test_header_is_aligned() {
        for cap in [16, 32, 48, 1024] {
            let slots = Table::slots_for(cap).unwrap();
            assert_eq!(Table::header_for(slots).unwrap() % 16, 0);
        }
    }

    #[test]
    fn test_insert_returns_row_index() {
        let mut table = Table::new();
        assert_eq!(table.insert((7, 70)).unwrap(), 0);
        assert_eq!(table.insert((8, 80)).unwrap(), 1);
        assert_eq!(table.get(&8), Some(1));
        assert_eq!(table.get(&9), None);
    }

    #[test]
    fn test_growth_keeps_every_key_reachable() {
        let table = filled(100);
        assert_eq!(table.capacity(), 128);
        for i in 0..100 {
            let row = table.get(&i).unwrap();
            assert_eq!(*table.at::<1>(row), i64::from(i) * 10);
        }
    }

    #[test]
    fn test_find_resumes_over_duplicates() {
        let mut table = Table::new();
        for value in [1, 2, 3] {
            table.insert((5, value)).unwrap();
        }
        table.insert((6, 0)).unwrap();

        let mut values = Vec::new();
        let mut found = table.find(&5, true);
        while let Some(row) = found {
            values.push(*table.at::<1>(row));
            found = table.find(&5, false);
        }
        assert_eq!(values, [1, 2, 3]);
        assert_eq!(table.find(&5, false), None);
    }

    #[test]
    fn test_find_on_empty_table() {
        let mut table = Table::new();
        assert_eq!(table.find(&1, true), None);
        assert_eq!(table.erase_found().unwrap(), 0);
    }

    #[test]
    fn test_miss_resets_cursor() {
        let mut table = filled(4);
        assert!(table.find(&2, true).is_some());
        assert_eq!(table.find(&99, true), None);
        assert_eq!(table.erase_found().unwrap(), 0);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_insert_into_cursor_tombstone_resets_cursor() {
        let mut table = filled(4);
        table.find(&3, true).unwrap();
        assert_eq!(table.erase_found().unwrap(), 1);
        assert_eq!(table.tombstones(), 1);

        // Same key, same probe path: the new row takes the cursor's tombstone.
        table.insert((3, 999)).unwrap();
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.remove_found().unwrap(), None);
        assert_eq!(table.erase_found().unwrap(), 0);
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(&3).map(|row| *table.at::<1>(row)), Some(999));
    }

    #[test]
    fn test_remove_found_moves_last_row() {
        let mut table = filled(5);
        table.find(&1, true).unwrap();
        assert_eq!(table.remove_found().unwrap(), Some((1, 10)));
        assert_eq!(table.len(), 4);
        assert_eq!(*table.at::<0>(1), 4);
        assert_eq!(table.get(&4), Some(1));
        assert_eq!(table.tombstones(), 1);
        assert!(table.is_consistent());
    }

    #[test]
    fn test_remove_last_row() {
        let mut table = filled(3);
        table.find(&2, true).unwrap();
        assert_eq!(table.remove_found().unwrap(), Some((2, 20)));
        assert_eq!(table.get(&2), None);
        assert_eq!(table.get(&1), Some(1));
    }

    #[test]
    fn test_erase_all_counts_duplicates() {
        let mut table = Table::new();
        for value in 0..6 {
            table.insert((value % 2, i64::from(value))).unwrap();
        }
        assert_eq!(table.erase_all(&0).unwrap(), 3);
        assert_eq!(table.get(&0), None);
        assert_eq!(table.count(&1), 3);
        assert_eq!(table.erase_all(&0).unwrap(), 0);
    }

    #[test]
    fn test_erase_sorted_keeps_order() {
        let mut table = filled(6);
        assert_eq!(table.erase_sorted(&2).unwrap(), 1);
        assert_eq!(table.column::<0>(), [0, 1, 3, 4, 5]);
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.get(&5), Some(4));
    }

    #[test]
    fn test_tombstones_trigger_rehash() {
        let mut table = filled(16);
        for key in 0..10 {
            assert_eq!(table.erase(&key).unwrap(), 1);
        }
        assert_eq!(table.tombstones(), 10);
        table.insert((100, 0)).unwrap();
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.capacity(), 16);
        assert!(table.is_consistent());
    }

    #[test]
    fn test_swap_rows_keeps_links() {
        let mut table = filled(4);
        table.swap_rows(0, 3).unwrap();
        assert_eq!(*table.at::<0>(0), 3);
        assert_eq!(table.get(&3), Some(0));
        assert_eq!(table.get(&0), Some(3));
        assert!(matches!(
            table.swap_rows(0, 9),
            Err(SoaError::OutOfBounds { index: 9, len: 4 })
        ));
    }

    #[test]
    fn test_sort_rehashes() {
        let mut table = Table::new();
        for (key, value) in [(1, 30), (2, 10), (3, 20)] {
            table.insert((key, value)).unwrap();
        }
        table.sort::<1>();
        assert_eq!(table.column::<1>(), [10, 20, 30]);
        assert_eq!(table.get(&2), Some(0));
        assert_eq!(table.get(&1), Some(2));
    }

    #[test]
    fn test_insert_sorted() {
        let mut table = Table::new();
        for key in [10, 30, 20] {
            table.insert_sorted::<0>((key, 0)).unwrap();
        }
        assert_eq!(table.column::<0>(), [10, 20, 30]);
        assert_eq!(table.get(&30), Some(2));
    }

    #[test]
    fn test_shrink_and_clear() {
        let mut table = filled(40);
        table.reserve(200).unwrap();
        table.shrink_to_fit().unwrap();
        assert_eq!(table.capacity(), 48);
        assert_eq!(table.get(&39), Some(39));

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 48);
        assert_eq!(table.get(&0), None);

        table.shrink_to_fit().unwrap();
        assert_eq!(table.capacity(), 0);
        assert_eq!(table.slot_capacity(), 0);
    }

    #[test]
    fn test_clone_copies_slots() {
        let mut table = filled(10);
        table.erase(&3).unwrap();
        let copy = table.clone();
        assert_eq!(copy.slot_map(), table.slot_map());
        assert_eq!(copy.tombstones(), 1);
        assert_eq!(copy.column::<0>(), table.column::<0>());
    }

    #[test]
    fn test_value_column_is_mutable() {
        let mut table = filled(3);
        *table.at_mut::<1>(2) = -1;
        assert_eq!(*table.at::<1>(2), -1);
        table.column_mut::<1>().fill(0);
        assert_eq!(table.column::<1>(), [0, 0, 0]);
    }

    #[test]
    fn test_string_keys_borrow_as_str() {
        let mut table: HTable<(String, u8)> = HTable::new();
        table.insert(("pear".to_string(), 1)).unwrap();
        assert!(table.contains_key("pear"));
        assert_eq!(table.erase("pear").unwrap(), 1);
        assert!(!table.contains_key("pear"));
    }
}
