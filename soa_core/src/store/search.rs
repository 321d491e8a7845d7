//! Binary search over a sorted column.

use crate::columns::{ColumnAt, Columns};
use crate::error::Result;

use super::Soa;

impl<R: Columns> Soa<R> {
    /// Index of the leftmost element of column `K` that is not less than
    /// `goal`. Column `K` must be sorted ascending.
    ///
    /// Equals the number of elements less than `goal`.
    pub fn lower_bound<const K: usize>(&self, goal: &<R as ColumnAt<K>>::Elem) -> usize
    where
        R: ColumnAt<K>,
        <R as ColumnAt<K>>::Elem: PartialOrd,
    {
        self.column::<K>().partition_point(|x| x < goal)
    }

    /// Index of the leftmost element of column `K` that is greater than
    /// `goal`. Column `K` must be sorted ascending.
    pub fn upper_bound<const K: usize>(&self, goal: &<R as ColumnAt<K>>::Elem) -> usize
    where
        R: ColumnAt<K>,
        <R as ColumnAt<K>>::Elem: PartialOrd,
    {
        self.column::<K>().partition_point(|x| !(goal < x))
    }

    /// [`Soa::lower_bound`] using field `K` of a whole row; the other fields
    /// are ignored.
    pub fn lower_bound_row<const K: usize>(&self, row: &R) -> usize
    where
        R: ColumnAt<K>,
        <R as ColumnAt<K>>::Elem: PartialOrd,
    {
        self.lower_bound::<K>(<R as ColumnAt<K>>::field(row))
    }

    /// Inserts `row` at its sorted position by column `K`, before any equal
    /// elements, and returns that position.
    ///
    /// # Errors
    ///
    /// Returns an error if growing fails; the store is unchanged.
    pub fn insert_sorted<const K: usize>(&mut self, row: R) -> Result<usize>
    where
        R: ColumnAt<K>,
        <R as ColumnAt<K>>::Elem: PartialOrd,
    {
        let at = self.lower_bound_row::<K>(&row);
        self.insert(at, row)?;
        Ok(at)
    }
}
