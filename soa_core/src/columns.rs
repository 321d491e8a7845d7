//! Typed column sets.
//!
//! A row type is a tuple `(A, B, ...)`; each tuple field becomes one column.
//! [`Columns`] describes how a row is scattered across the column arrays of
//! a buffer, and [`ColumnAt`] resolves a column index to its element type at
//! compile time, so `soa.at::<1>(row)` is statically typed with no dispatch.
//!
//! Column `k` of a buffer holding `cap` rows starts at
//! `base + cap * (width_0 + ... + width_{k-1})`.

use std::mem::{align_of, needs_drop, size_of};
use std::ptr;

use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Byte offset of column `k` from the first column, for `cap` rows.
#[inline]
pub const fn column_offset(widths: &[usize], k: usize, cap: usize) -> usize {
    let mut i = 0;
    let mut prefix = 0;
    while i < k {
        prefix += widths[i];
        i += 1;
    }
    prefix * cap
}

const fn max_of(values: &[usize]) -> usize {
    let mut i = 0;
    let mut max = 1;
    while i < values.len() {
        if values[i] > max {
            max = values[i];
        }
        i += 1;
    }
    max
}

const fn sum_of(values: &[usize]) -> usize {
    let mut i = 0;
    let mut sum = 0;
    while i < values.len() {
        sum += values[i];
        i += 1;
    }
    sum
}

/// A row type whose fields are stored column by column.
///
/// Implemented for tuples of arity 1 through 8.
///
/// # Safety
///
/// `WIDTHS[k]` must be the size of field `k`, `MAX_ALIGN` the largest field
/// alignment, and the raw methods must read and write field `k` at
/// `column_offset(WIDTHS, k, cap) + row * WIDTHS[k]` from `base`.
pub unsafe trait Columns: Sized {
    /// Number of columns.
    const ARITY: usize;
    /// `size_of` of each field, in column order.
    const WIDTHS: &'static [usize];
    /// Sum of `WIDTHS`: bytes one row occupies across all columns.
    const ROW_BYTES: usize;
    /// Largest field alignment.
    const MAX_ALIGN: usize;
    /// True if any field has drop glue.
    const NEEDS_DROP: bool;

    /// A row borrowed in place, as a tuple of references.
    type Ref<'a>: Copy
    where
        Self: 'a;

    /// Moves each field of `self` into its column at `row`.
    ///
    /// # Safety
    ///
    /// `base` must point at column 0 of a buffer laid out for `cap` rows and
    /// `row < cap`. Any value already at `row` is overwritten without drop.
    unsafe fn write(self, base: *mut u8, cap: usize, row: usize);

    /// Moves the fields at `row` out of their columns.
    ///
    /// # Safety
    ///
    /// As for `write`, and `row` must hold an initialized row, which is
    /// logically uninitialized afterwards.
    unsafe fn read(base: *const u8, cap: usize, row: usize) -> Self;

    /// Drops the fields at `row` in place.
    ///
    /// # Safety
    ///
    /// As for `read`.
    unsafe fn drop_in_place(base: *mut u8, cap: usize, row: usize);

    /// Borrows the fields at `row`.
    ///
    /// # Safety
    ///
    /// As for `read`, and the row must outlive `'a` without being mutated.
    unsafe fn borrow<'a>(base: *const u8, cap: usize, row: usize) -> Self::Ref<'a>;
}

/// Compile-time access to column `K` of a row type.
pub trait ColumnAt<const K: usize>: Columns {
    /// Element type stored in column `K`.
    type Elem;

    /// Field `K` of a whole row value.
    fn field(row: &Self) -> &Self::Elem;
}

/// A row type whose every column is plain bytes, so the store's raw buffer
/// can be serialized and restored byte for byte.
///
/// Each field must be [`FromBytes`] (any bit pattern is a valid value),
/// [`IntoBytes`] (no padding) and [`Immutable`] (no interior mutability).
///
/// # Safety
///
/// Implemented only by the tuple impls below.
pub unsafe trait PlainRow: Columns + Copy {}

/// A row type whose fields can all be cloned in place.
///
/// # Safety
///
/// `clone_at` must follow the same addressing rules as [`Columns::read`].
pub unsafe trait CloneRow: Columns + Clone {
    /// Clones the fields at `row` without moving them.
    ///
    /// # Safety
    ///
    /// As for [`Columns::borrow`].
    unsafe fn clone_at(base: *const u8, cap: usize, row: usize) -> Self;
}

macro_rules! impl_column_at {
    ([$($all:ident),*]) => {};
    ([$($all:ident),*] $idx:tt $ty:ident $(, $ridx:tt $rty:ident)*) => {
        impl<$($all),*> ColumnAt<$idx> for ($($all,)*) {
            type Elem = $ty;

            #[inline]
            fn field(row: &Self) -> &Self::Elem {
                &row.$idx
            }
        }

        impl_column_at!([$($all),*] $($ridx $rty),*);
    };
}

macro_rules! impl_columns {
    ($arity:expr; $($idx:tt $ty:ident),+) => {
        // SAFETY: each method addresses field `$idx` through `column_offset`
        // with the widths recorded in `WIDTHS`.
        unsafe impl<$($ty),+> Columns for ($($ty,)+) {
            const ARITY: usize = $arity;
            const WIDTHS: &'static [usize] = &[$(size_of::<$ty>()),+];
            const ROW_BYTES: usize = sum_of(Self::WIDTHS);
            const MAX_ALIGN: usize = max_of(&[$(align_of::<$ty>()),+]);
            const NEEDS_DROP: bool = false $(|| needs_drop::<$ty>())+;

            type Ref<'a> = ($(&'a $ty,)+) where Self: 'a;

            #[inline]
            unsafe fn write(self, base: *mut u8, cap: usize, row: usize) {
                $(
                    // SAFETY: forwarded from the caller.
                    unsafe {
                        let col = base.add(column_offset(Self::WIDTHS, $idx, cap)).cast::<$ty>();
                        ptr::write(col.add(row), self.$idx);
                    }
                )+
            }

            #[inline]
            unsafe fn read(base: *const u8, cap: usize, row: usize) -> Self {
                // SAFETY: forwarded from the caller.
                unsafe {
                    ($(
                        ptr::read(
                            base.add(column_offset(Self::WIDTHS, $idx, cap))
                                .cast::<$ty>()
                                .add(row),
                        ),
                    )+)
                }
            }

            #[inline]
            unsafe fn drop_in_place(base: *mut u8, cap: usize, row: usize) {
                $(
                    // SAFETY: forwarded from the caller.
                    unsafe {
                        let col = base.add(column_offset(Self::WIDTHS, $idx, cap)).cast::<$ty>();
                        ptr::drop_in_place(col.add(row));
                    }
                )+
            }

            #[inline]
            unsafe fn borrow<'a>(base: *const u8, cap: usize, row: usize) -> Self::Ref<'a> {
                // SAFETY: forwarded from the caller.
                unsafe {
                    ($(
                        &*base
                            .add(column_offset(Self::WIDTHS, $idx, cap))
                            .cast::<$ty>()
                            .add(row),
                    )+)
                }
            }
        }

        // SAFETY: same addressing as `borrow`.
        unsafe impl<$($ty: Clone),+> CloneRow for ($($ty,)+) {
            #[inline]
            unsafe fn clone_at(base: *const u8, cap: usize, row: usize) -> Self {
                // SAFETY: forwarded from the caller.
                let refs = unsafe { <Self as Columns>::borrow(base, cap, row) };
                ($(refs.$idx.clone(),)+)
            }
        }

        // SAFETY: every field accepts any bit pattern and has no padding, and
        // columns are stored back to back with nothing between elements.
        unsafe impl<$($ty: FromBytes + IntoBytes + Immutable + Copy),+> PlainRow for ($($ty,)+) {}

        impl_column_at!([$($ty),+] $($idx $ty),+);
    };
}

impl_columns!(1; 0 A);
impl_columns!(2; 0 A, 1 B);
impl_columns!(3; 0 A, 1 B, 2 C);
impl_columns!(4; 0 A, 1 B, 2 C, 3 D);
impl_columns!(5; 0 A, 1 B, 2 C, 3 D, 4 E);
impl_columns!(6; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_columns!(7; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_columns!(8; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);

#[cfg(test)]
mod tests {
    use super::*;

    type Wide = (i32, String, i16, f64);

    #[test]
    fn test_widths_follow_field_order() {
        assert_eq!(
            <Wide as Columns>::WIDTHS,
            &[4, size_of::<String>(), 2, 8]
        );
        assert_eq!(<Wide as Columns>::ARITY, 4);
        assert_eq!(
            <Wide as Columns>::ROW_BYTES,
            4 + size_of::<String>() + 2 + 8
        );
    }

    #[test]
    fn test_needs_drop() {
        assert!(<Wide as Columns>::NEEDS_DROP);
        assert!(!<(u32, f32) as Columns>::NEEDS_DROP);
    }

    #[test]
    fn test_max_align() {
        assert_eq!(<(u8, u16) as Columns>::MAX_ALIGN, 2);
        assert_eq!(<(u8, u64, u32) as Columns>::MAX_ALIGN, 8);
    }

    #[test]
    fn test_column_offset() {
        let widths = [4, 24, 2];
        assert_eq!(column_offset(&widths, 0, 16), 0);
        assert_eq!(column_offset(&widths, 1, 16), 64);
        assert_eq!(column_offset(&widths, 2, 16), 64 + 384);
    }

    fn assert_plain<R: PlainRow>() {}

    #[test]
    fn test_byte_rows_are_plain() {
        assert_plain::<(u64, i32)>();
        assert_plain::<(u8, [u16; 4], f64)>();
    }

    #[test]
    fn test_field_access() {
        let row: Wide = (7, "seven".to_string(), -7, 7.0);
        assert_eq!(*<Wide as ColumnAt<0>>::field(&row), 7);
        assert_eq!(<Wide as ColumnAt<1>>::field(&row), "seven");
        assert_eq!(*<Wide as ColumnAt<2>>::field(&row), -7);
    }

    #[test]
    fn test_raw_round_trip_through_columns() {
        #[repr(C, align(16))]
        struct Block([u8; 128]);

        let mut block = Block([0; 128]);
        let base = block.0.as_mut_ptr();
        // SAFETY: 16 rows of (u32, u16) need 96 bytes, and rows 0..2 are
        // written before they are read.
        unsafe {
            <(u32, u16)>::write((1, 10), base, 16, 0);
            <(u32, u16)>::write((2, 20), base, 16, 1);
            let (a, b) = <(u32, u16)>::borrow(base, 16, 1);
            assert_eq!((*a, *b), (2, 20));
            assert_eq!(<(u32, u16)>::read(base, 16, 0), (1, 10));
        }
        // Column 1 starts right after sixteen u32 values.
        assert_eq!(block.0[64], 10);
    }
}
