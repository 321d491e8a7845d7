//! Struct-of-arrays storage.
//!
//! `Soa<R>` stores rows of type `R` (a tuple) as one array per tuple field.
//! All arrays live back to back in a single [`AlignedBuf`]:
//!
//! ```text
//! +----------------------+ base
//! | header (index only)  |
//! +----------------------+ base + header
//! | column 0 x capacity  |
//! +----------------------+
//! | column 1 x capacity  |
//! +----------------------+
//! | ...                  |
//! +----------------------+
//! ```
//!
//! The capacity is always a multiple of 16 rows, so every column starts on a
//! 16-byte boundary. Changing the capacity rebuilds the whole buffer.

mod search;
mod serial;
mod sort;

use std::fmt;
use std::marker::PhantomData;
use std::ptr;

use contracts::*;
use tracing::debug;

use crate::alloc::AlignedBuf;
use crate::columns::{CloneRow, ColumnAt, Columns, column_offset};
use crate::constants::{ALIGNMENT, MIN_CAPACITY, align_rows};
use crate::error::{Result, SoaError};

/// A struct-of-arrays container.
///
/// Rows `[0, len)` are initialized in every column; slots `[len, capacity)`
/// hold no live values.
pub struct Soa<R: Columns> {
    /// The single allocation backing every column.
    buf: AlignedBuf,
    /// Bytes reserved in front of column 0.
    header: usize,
    /// Number of live rows.
    len: usize,
    /// Number of row slots per column.
    cap: usize,
    _rows: PhantomData<R>,
}

impl<R: Columns> Soa<R> {
    /// Creates an empty store. Does not allocate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: AlignedBuf::empty(),
            header: 0,
            len: 0,
            cap: 0,
            _rows: PhantomData,
        }
    }

    /// Creates an empty store able to hold `n` rows without reallocating.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails.
    pub fn with_capacity(n: usize) -> Result<Self> {
        let mut soa = Self::new();
        soa.reserve(n)?;
        Ok(soa)
    }

    /// Creates a store holding `n` default rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails.
    pub fn with_len(n: usize) -> Result<Self>
    where
        R: Default,
    {
        let mut soa = Self::new();
        soa.resize(n)?;
        Ok(soa)
    }

    /// Creates a store holding `n` clones of `row`.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails.
    pub fn from_elem(n: usize, row: R) -> Result<Self>
    where
        R: Clone,
    {
        let mut soa = Self::new();
        soa.resize_with_value(n, row)?;
        Ok(soa)
    }

    /// Creates a store from a sequence of rows, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns an error if an allocation fails.
    pub fn from_rows<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
    {
        let rows = rows.into_iter();
        let mut soa = Self::new();
        let (lower, _) = rows.size_hint();
        if lower > 0 {
            soa.reserve(lower)?;
        }
        for row in rows {
            soa.push(row)?;
        }
        Ok(soa)
    }

    /// Clones every row into a new store sized for exactly those rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails.
    pub fn try_clone(&self) -> Result<Self>
    where
        R: CloneRow,
    {
        let mut soa = Self::new();
        if self.len > 0 {
            soa.reserve(self.len)?;
        }
        for i in 0..self.len {
            // SAFETY: `i < len`, and `soa` has room for every row.
            unsafe {
                let row = R::clone_at(self.base(), self.cap, i);
                soa.write_unchecked(row);
            }
        }
        Ok(soa)
    }

    /// Checks the layout invariants.
    pub(crate) fn is_valid_state(&self) -> bool {
        self.len <= self.cap
            && self.cap % ALIGNMENT == 0
            && (self.cap == 0 || self.buf.len() == self.header + self.cap * R::ROW_BYTES)
    }

    // =========================================================================
    // Size and capacity
    // =========================================================================

    /// Number of rows.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if there are no rows.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of rows the store can hold before it must reallocate.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.cap
    }

    /// Upper bound on the number of rows, ignoring available memory.
    #[inline]
    pub const fn max_size(&self) -> usize {
        if R::ROW_BYTES == 0 {
            usize::MAX
        } else {
            isize::MAX as usize / R::ROW_BYTES
        }
    }

    /// Ensures room for at least `n` rows.
    ///
    /// The capacity is rounded up to a multiple of 16 (at least 16). Never
    /// shrinks.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails; the store is unchanged.
    #[debug_ensures(self.is_valid_state())]
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        let target = Self::target_capacity(n)?;
        if target <= self.cap {
            return Ok(());
        }
        self.relocate(target, self.header)
    }

    /// Shrinks the capacity to the smallest multiple of 16 holding every
    /// row, freeing the buffer entirely when empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails; the store is unchanged.
    #[debug_ensures(self.is_valid_state())]
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        let target = Self::aligned(self.len)?;
        if target == self.cap {
            return Ok(());
        }
        if target == 0 {
            self.release();
            return Ok(());
        }
        self.relocate(target, self.header)
    }

    /// Drops every row. The capacity is unchanged.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Drops every row from `n` onwards.
    pub fn truncate(&mut self, n: usize) {
        if n >= self.len {
            return;
        }
        let old_len = self.len;
        // Shorten first so a panicking destructor leaks instead of double-dropping.
        self.len = n;
        if R::NEEDS_DROP {
            for i in n..old_len {
                // SAFETY: rows in `[n, old_len)` were live and are no longer reachable.
                unsafe { R::drop_in_place(self.base(), self.cap, i) };
            }
        }
    }

    /// Resizes to exactly `n` rows, creating new rows with `f`.
    ///
    /// # Errors
    ///
    /// Returns an error if growing fails; the store is unchanged.
    pub fn resize_with<F>(&mut self, n: usize, mut f: F) -> Result<()>
    where
        F: FnMut() -> R,
    {
        if n <= self.len {
            self.truncate(n);
            return Ok(());
        }
        if n > self.cap {
            self.reserve(n)?;
        }
        while self.len < n {
            // SAFETY: capacity was reserved above.
            unsafe { self.write_unchecked(f()) };
        }
        Ok(())
    }

    /// Resizes to exactly `n` rows, filling with default rows.
    ///
    /// # Errors
    ///
    /// Returns an error if growing fails; the store is unchanged.
    pub fn resize(&mut self, n: usize) -> Result<()>
    where
        R: Default,
    {
        self.resize_with(n, R::default)
    }

    /// Resizes to exactly `n` rows, filling with clones of `row`.
    ///
    /// # Errors
    ///
    /// Returns an error if growing fails; the store is unchanged.
    pub fn resize_with_value(&mut self, n: usize, row: R) -> Result<()>
    where
        R: Clone,
    {
        self.resize_with(n, || row.clone())
    }

    // =========================================================================
    // Row mutation
    // =========================================================================

    /// Appends a row, doubling the capacity when full.
    ///
    /// # Errors
    ///
    /// Returns an error if growing fails; the row is dropped and the store
    /// is unchanged.
    #[debug_ensures(self.is_valid_state())]
    pub fn push(&mut self, row: R) -> Result<()> {
        self.grow_for_one()?;
        // SAFETY: `grow_for_one` guarantees `len < cap`.
        unsafe { self.write_unchecked(row) };
        Ok(())
    }

    /// Appends a default row.
    ///
    /// # Errors
    ///
    /// Returns an error if growing fails.
    pub fn push_default(&mut self) -> Result<()>
    where
        R: Default,
    {
        self.push(R::default())
    }

    /// Inserts a row at `at`, shifting every later row back by one.
    ///
    /// # Errors
    ///
    /// Returns `SoaError::OutOfBounds` if `at > len`, or an error if growing
    /// fails. The store is unchanged in both cases.
    #[debug_ensures(self.is_valid_state())]
    pub fn insert(&mut self, at: usize, row: R) -> Result<()> {
        if at > self.len {
            return Err(SoaError::OutOfBounds {
                index: at,
                len: self.len,
            });
        }
        self.grow_for_one()?;
        let (base, cap, len) = (self.base(), self.cap, self.len);
        for (k, width) in R::WIDTHS.iter().enumerate() {
            // SAFETY: rows `[at, len)` move to `[at + 1, len + 1)`, which is
            // within capacity after `grow_for_one`.
            unsafe {
                let col = base.add(column_offset(R::WIDTHS, k, cap));
                ptr::copy(
                    col.add(at * width),
                    col.add((at + 1) * width),
                    (len - at) * width,
                );
            }
        }
        // SAFETY: row `at` was vacated by the shift.
        unsafe { row.write(base, cap, at) };
        self.len += 1;
        Ok(())
    }

    /// Inserts a default row at `at`.
    ///
    /// # Errors
    ///
    /// See [`Soa::insert`].
    pub fn insert_default(&mut self, at: usize) -> Result<()>
    where
        R: Default,
    {
        self.insert(at, R::default())
    }

    /// Removes and returns the last row.
    pub fn pop(&mut self) -> Option<R> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: row `len` was live and is now outside the live range.
        Some(unsafe { R::read(self.base(), self.cap, self.len) })
    }

    /// Removes row `i` by moving the last row into its place.
    ///
    /// O(1), but does not preserve order. Returns `None` if `i` is out of
    /// bounds.
    #[debug_ensures(self.is_valid_state())]
    pub fn erase_swap(&mut self, i: usize) -> Option<R> {
        if i >= self.len {
            return None;
        }
        let (base, cap) = (self.base(), self.cap);
        let last = self.len - 1;
        // SAFETY: `i` is live; it is refilled from `last` (or dropped from the
        // live range when `i == last`) before anyone can observe it.
        let removed = unsafe { R::read(base, cap, i) };
        if i != last {
            for (k, width) in R::WIDTHS.iter().enumerate() {
                // SAFETY: both rows are inside the allocation and distinct.
                unsafe {
                    let col = base.add(column_offset(R::WIDTHS, k, cap));
                    ptr::copy_nonoverlapping(col.add(last * width), col.add(i * width), *width);
                }
            }
        }
        self.len = last;
        Some(removed)
    }

    /// Removes row `i` and shifts every later row forward by one.
    ///
    /// O(len - i); preserves order. Returns `None` if `i` is out of bounds.
    #[debug_ensures(self.is_valid_state())]
    pub fn erase_shift(&mut self, i: usize) -> Option<R> {
        if i >= self.len {
            return None;
        }
        let (base, cap, len) = (self.base(), self.cap, self.len);
        // SAFETY: `i` is live and is overwritten by the shift below.
        let removed = unsafe { R::read(base, cap, i) };
        for (k, width) in R::WIDTHS.iter().enumerate() {
            // SAFETY: rows `[i + 1, len)` move to `[i, len - 1)`.
            unsafe {
                let col = base.add(column_offset(R::WIDTHS, k, cap));
                ptr::copy(
                    col.add((i + 1) * width),
                    col.add(i * width),
                    (len - i - 1) * width,
                );
            }
        }
        self.len -= 1;
        Some(removed)
    }

    /// Swaps rows `a` and `b` across every column.
    ///
    /// # Errors
    ///
    /// Returns `SoaError::OutOfBounds` if either index is past the end.
    pub fn swap_rows(&mut self, a: usize, b: usize) -> Result<()> {
        for index in [a, b] {
            if index >= self.len {
                return Err(SoaError::OutOfBounds {
                    index,
                    len: self.len,
                });
            }
        }
        if a != b {
            // SAFETY: both rows were bounds-checked and are distinct.
            unsafe { self.swap_unchecked(a, b) };
        }
        Ok(())
    }

    /// Swaps two distinct live rows.
    ///
    /// # Safety
    ///
    /// `a` and `b` must be distinct and less than `len`.
    pub(crate) unsafe fn swap_unchecked(&mut self, a: usize, b: usize) {
        debug_assert!(a != b && a < self.len && b < self.len);
        let (base, cap) = (self.base(), self.cap);
        for (k, width) in R::WIDTHS.iter().enumerate() {
            // SAFETY: forwarded from the caller; distinct rows never overlap.
            unsafe {
                let col = base.add(column_offset(R::WIDTHS, k, cap));
                ptr::swap_nonoverlapping(col.add(a * width), col.add(b * width), *width);
            }
        }
    }

    // =========================================================================
    // Element access
    // =========================================================================

    /// Column `K` as a slice of `len` elements.
    #[inline]
    pub fn column<const K: usize>(&self) -> &[<R as ColumnAt<K>>::Elem]
    where
        R: ColumnAt<K>,
    {
        // SAFETY: the first `len` elements of every column are initialized.
        unsafe { std::slice::from_raw_parts(self.column_base::<K>(), self.len) }
    }

    /// Column `K` as a mutable slice of `len` elements.
    #[inline]
    pub fn column_mut<const K: usize>(&mut self) -> &mut [<R as ColumnAt<K>>::Elem]
    where
        R: ColumnAt<K>,
    {
        // SAFETY: as for `column`, with exclusive access through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.column_base::<K>(), self.len) }
    }

    /// Base address of column `K`.
    ///
    /// Column `K + 1` always starts `size_of::<Elem>() * capacity` bytes
    /// after column `K`.
    #[inline]
    pub fn column_ptr<const K: usize>(&self) -> *const <R as ColumnAt<K>>::Elem
    where
        R: ColumnAt<K>,
    {
        self.column_base::<K>()
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
        &self.column::<K>()[i]
    }

    /// Mutable element `i` of column `K`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len`.
    #[inline]
    pub fn at_mut<const K: usize>(&mut self, i: usize) -> &mut <R as ColumnAt<K>>::Elem
    where
        R: ColumnAt<K>,
    {
        &mut self.column_mut::<K>()[i]
    }

    /// Element `i` of column `K`, or `None` if out of bounds.
    #[inline]
    pub fn get<const K: usize>(&self, i: usize) -> Option<&<R as ColumnAt<K>>::Elem>
    where
        R: ColumnAt<K>,
    {
        self.column::<K>().get(i)
    }

    /// First element of column `K`.
    #[inline]
    pub fn front<const K: usize>(&self) -> Option<&<R as ColumnAt<K>>::Elem>
    where
        R: ColumnAt<K>,
    {
        self.column::<K>().first()
    }

    /// Last element of column `K`.
    #[inline]
    pub fn back<const K: usize>(&self) -> Option<&<R as ColumnAt<K>>::Elem>
    where
        R: ColumnAt<K>,
    {
        self.column::<K>().last()
    }

    /// Row `i` as a tuple of references.
    #[inline]
    pub fn row(&self, i: usize) -> Option<R::Ref<'_>> {
        if i >= self.len {
            return None;
        }
        // SAFETY: `i` is live and borrowed for the lifetime of `&self`.
        Some(unsafe { R::borrow(self.base(), self.cap, i) })
    }

    /// A clone of row `i`.
    pub fn clone_row(&self, i: usize) -> Option<R>
    where
        R: CloneRow,
    {
        if i >= self.len {
            return None;
        }
        // SAFETY: `i` is live.
        Some(unsafe { R::clone_at(self.base(), self.cap, i) })
    }

    /// Iterates over rows in order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = R::Ref<'_>> + '_ {
        // SAFETY: every `i < len` is live.
        (0..self.len).map(move |i| unsafe { R::borrow(self.base(), self.cap, i) })
    }

    // =========================================================================
    // Raw layout (shared with the hash index)
    // =========================================================================

    /// Address of column 0.
    #[inline]
    fn base(&self) -> *mut u8 {
        // SAFETY: `header` never exceeds the buffer length (both are zero for
        // an empty buffer).
        unsafe { self.buf.as_ptr().add(self.header) }
    }

    #[inline]
    fn column_base<const K: usize>(&self) -> *mut <R as ColumnAt<K>>::Elem
    where
        R: ColumnAt<K>,
    {
        // SAFETY: column `K` starts inside the buffer (or at its end for
        // zero-sized columns).
        unsafe { self.base().add(column_offset(R::WIDTHS, K, self.cap)).cast() }
    }

    /// Address of the header region in front of column 0.
    #[inline]
    pub(crate) fn header_ptr(&self) -> *mut u8 {
        self.buf.as_ptr()
    }

    /// Size in bytes of the header region.
    #[inline]
    pub(crate) const fn header_len(&self) -> usize {
        self.header
    }

    /// The whole buffer, header included.
    #[inline]
    pub(crate) const fn buffer(&self) -> &AlignedBuf {
        &self.buf
    }

    /// The whole buffer, header included.
    #[inline]
    pub(crate) const fn buffer_mut(&mut self) -> &mut AlignedBuf {
        &mut self.buf
    }

    /// Overrides the row count after raw bytes were copied in.
    ///
    /// # Safety
    ///
    /// Rows `[0, n)` must hold valid values and `n <= capacity`.
    pub(crate) unsafe fn set_len(&mut self, n: usize) {
        debug_assert!(n <= self.cap);
        self.len = n;
    }

    /// Row capacity for a request of `n` rows: a multiple of 16, at least 16.
    pub(crate) fn target_capacity(n: usize) -> Result<usize> {
        Ok(Self::aligned(n)?.max(MIN_CAPACITY))
    }

    pub(crate) fn aligned(n: usize) -> Result<usize> {
        align_rows(n).ok_or(SoaError::CapacityOverflow {
            requested: n,
            row_bytes: R::ROW_BYTES,
        })
    }

    /// Buffer length for `cap` rows behind `header` bytes.
    pub(crate) fn buffer_len(cap: usize, header: usize) -> Result<usize> {
        cap.checked_mul(R::ROW_BYTES)
            .and_then(|bytes| bytes.checked_add(header))
            .ok_or(SoaError::CapacityOverflow {
                requested: cap,
                row_bytes: R::ROW_BYTES,
            })
    }

    /// Moves every row into a fresh buffer of `cap` rows behind `header`
    /// bytes. The new header region is zeroed; the old one is discarded.
    ///
    /// The old buffer is released only after the new one was obtained, so
    /// on error nothing changes.
    pub(crate) fn relocate(&mut self, cap: usize, header: usize) -> Result<()> {
        debug_assert!(cap >= self.len && cap % ALIGNMENT == 0 && header % ALIGNMENT == 0);
        if R::MAX_ALIGN > ALIGNMENT {
            return Err(SoaError::UnsupportedAlignment {
                align: R::MAX_ALIGN,
                max: ALIGNMENT,
            });
        }
        let bytes = Self::buffer_len(cap, header)?;
        let fresh = AlignedBuf::zeroed(bytes)?;
        debug!(
            old_capacity = self.cap,
            new_capacity = cap,
            header,
            bytes,
            "reallocating column buffer"
        );

        let old_base = self.base();
        // SAFETY: `header <= bytes`.
        let new_base = unsafe { fresh.as_ptr().add(header) };
        for (k, width) in R::WIDTHS.iter().enumerate() {
            // SAFETY: `len` rows fit in both layouts, and the buffers are
            // distinct allocations.
            unsafe {
                ptr::copy_nonoverlapping(
                    old_base.add(column_offset(R::WIDTHS, k, self.cap)),
                    new_base.add(column_offset(R::WIDTHS, k, cap)),
                    self.len * width,
                );
            }
        }

        // Rows were moved bitwise; dropping the old buffer only frees memory.
        self.buf = fresh;
        self.cap = cap;
        self.header = header;
        Ok(())
    }

    /// Frees the buffer. Only valid while empty.
    pub(crate) fn release(&mut self) {
        debug_assert_eq!(self.len, 0);
        debug!(old_capacity = self.cap, "releasing column buffer");
        self.buf = AlignedBuf::empty();
        self.cap = 0;
        self.header = 0;
    }

    /// Appends without checking capacity.
    ///
    /// # Safety
    ///
    /// `len < capacity`.
    #[inline]
    pub(crate) unsafe fn write_unchecked(&mut self, row: R) {
        debug_assert!(self.len < self.cap);
        // SAFETY: forwarded from the caller.
        unsafe { row.write(self.base(), self.cap, self.len) };
        self.len += 1;
    }

    /// Makes room for one more row, doubling the capacity when full.
    fn grow_for_one(&mut self) -> Result<()> {
        if self.len < self.cap {
            return Ok(());
        }
        let doubled = self.cap.checked_mul(2).ok_or(SoaError::CapacityOverflow {
            requested: self.cap,
            row_bytes: R::ROW_BYTES,
        })?;
        self.reserve(doubled.max(MIN_CAPACITY))
    }
}

impl<R: Columns> Default for Soa<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Columns> Drop for Soa<R> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<R: CloneRow> Clone for Soa<R> {
    fn clone(&self) -> Self {
        self.try_clone().unwrap_or_else(|err| err.abort())
    }
}

impl<R: Columns> fmt::Debug for Soa<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Soa")
            .field("len", &self.len)
            .field("capacity", &self.cap)
            .field("columns", &R::ARITY)
            .field("bytes", &self.buf.len())
            .finish()
    }
}
