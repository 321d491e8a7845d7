//! In-place sorting of whole rows by one column.

use tracing::trace;

use crate::columns::{ColumnAt, Columns};

use super::Soa;

impl<R: Columns> Soa<R> {
    /// Sorts rows ascending by column `K` and returns the number of row
    /// swaps performed.
    ///
    /// Iterative quicksort (Lomuto partition, explicit stack); every move is
    /// a whole-row swap across all columns. Not stable.
    ///
    /// Only swaps that move data are counted: a row swapped with itself is
    /// skipped, so already sorted input returns 0.
    pub fn sort<const K: usize>(&mut self) -> usize
    where
        R: ColumnAt<K>,
        <R as ColumnAt<K>>::Elem: PartialOrd,
    {
        if self.len < 2 {
            return 0;
        }
        let mut swaps = 0;
        let mut stack = vec![(0, self.len - 1)];
        while let Some((low, high)) = stack.pop() {
            let pivot = self.partition::<K>(low, high, &mut swaps);
            let left = (pivot > low + 1).then(|| (low, pivot - 1));
            let right = (pivot + 1 < high).then(|| (pivot + 1, high));
            // Larger side first, so the smaller one is popped next and the
            // stack stays logarithmic.
            match (left, right) {
                (Some(l), Some(r)) if l.1 - l.0 > r.1 - r.0 => stack.extend([l, r]),
                (Some(l), Some(r)) => stack.extend([r, l]),
                (Some(side), None) | (None, Some(side)) => stack.push(side),
                (None, None) => {}
            }
        }
        trace!(rows = self.len, swaps, column = K, "sorted rows");
        swaps
    }

    fn partition<const K: usize>(&mut self, low: usize, high: usize, swaps: &mut usize) -> usize
    where
        R: ColumnAt<K>,
        <R as ColumnAt<K>>::Elem: PartialOrd,
    {
        let mut store = low;
        for j in low..high {
            // The pivot stays at `high` until the final swap.
            if self.at::<K>(j) < self.at::<K>(high) {
                if store != j {
                    // SAFETY: `store < j <= high < len`.
                    unsafe { self.swap_unchecked(store, j) };
                    *swaps += 1;
                }
                store += 1;
            }
        }
        if store != high {
            // SAFETY: `store < high < len`.
            unsafe { self.swap_unchecked(store, high) };
            *swaps += 1;
        }
        store
    }
}
