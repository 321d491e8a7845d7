//! Slot encoding for the probe array.
//!
//! A slot is one `u32`: a row index, or one of two reserved values at the
//! top of the range. Keeping the sentinels inside the index type keeps the
//! slot array at four bytes per entry.

use std::fmt;

/// One entry of the probe array.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(u32);

/// Decoded meaning of a [`Slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Never used since the last rehash; ends a probe sequence.
    Empty,
    /// Held a row that was erased; probing continues past it.
    Tombstone,
    /// Refers to a live row.
    Row(usize),
}

impl Slot {
    /// The never-used marker.
    pub const EMPTY: Self = Self(u32::MAX);
    /// The erased-entry marker.
    pub const TOMBSTONE: Self = Self(u32::MAX - 1);
    /// Number of addressable rows; every row index stays below the sentinels.
    pub const MAX_ROWS: usize = (u32::MAX - 2) as usize;

    /// A slot referring to row `index`.
    #[inline]
    pub(crate) const fn row(index: usize) -> Self {
        debug_assert!(index < Self::MAX_ROWS);
        Self(index as u32)
    }

    /// The raw encoded value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Decodes the slot.
    #[inline]
    pub const fn state(self) -> SlotState {
        match self {
            Self::EMPTY => SlotState::Empty,
            Self::TOMBSTONE => SlotState::Tombstone,
            Self(index) => SlotState::Row(index as usize),
        }
    }

    /// True for [`Slot::EMPTY`].
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == Self::EMPTY.0
    }

    /// True for [`Slot::TOMBSTONE`].
    #[inline]
    pub const fn is_tombstone(self) -> bool {
        self.0 == Self::TOMBSTONE.0
    }

    /// The referenced row, if any.
    #[inline]
    pub const fn row_index(self) -> Option<usize> {
        match self.state() {
            SlotState::Row(index) => Some(index),
            _ => None,
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state() {
            SlotState::Empty => write!(f, "-"),
            SlotState::Tombstone => write!(f, "x"),
            SlotState::Row(index) => write!(f, "{index}"),
        }
    }
}
