//! Slot-map statistics.

use std::fmt;

use super::slot::Slot;
use crate::constants::PROBE_STRIDE;

/// Occupancy summary of a slot array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    /// Total slots.
    pub slots: usize,
    /// Slots never used since the last rehash.
    pub empty: usize,
    /// Slots of erased entries.
    pub tombstones: usize,
    /// Slots referring to live rows.
    pub occupied: usize,
    /// Longest run of non-empty slots along the probe sequence. Every miss
    /// walks at most this many slots.
    pub longest_run: usize,
}

impl SlotStats {
    pub(crate) fn collect(slots: &[Slot]) -> Self {
        let mut stats = Self {
            slots: slots.len(),
            ..Self::default()
        };
        for slot in slots {
            if slot.is_empty() {
                stats.empty += 1;
            } else if slot.is_tombstone() {
                stats.tombstones += 1;
            } else {
                stats.occupied += 1;
            }
        }
        if stats.empty == 0 {
            stats.longest_run = slots.len();
            return stats;
        }

        // Walk the whole probe cycle twice so runs that wrap are counted once
        // in full.
        let mut run = 0;
        let mut pos = 0;
        for _ in 0..2 * slots.len() {
            if slots[pos].is_empty() {
                run = 0;
            } else {
                run += 1;
                stats.longest_run = stats.longest_run.max(run);
            }
            pos = (pos + PROBE_STRIDE) % slots.len();
        }
        stats
    }

    /// Fraction of slots that are not empty.
    pub fn load_factor(&self) -> f64 {
        if self.slots == 0 {
            return 0.0;
        }
        (self.occupied + self.tombstones) as f64 / self.slots as f64
    }
}

impl fmt::Display for SlotStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} slots: {} occupied, {} tombstones, {} empty, longest run {}, load {:.2}",
            self.slots,
            self.occupied,
            self.tombstones,
            self.empty,
            self.longest_run,
            self.load_factor()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let slots = [Slot::EMPTY, Slot::row(0), Slot::TOMBSTONE, Slot::row(1), Slot::EMPTY];
        let stats = SlotStats::collect(&slots);
        assert_eq!(stats.slots, 5);
        assert_eq!(stats.empty, 2);
        assert_eq!(stats.tombstones, 1);
        assert_eq!(stats.occupied, 2);
    }

    #[test]
    fn test_longest_run_follows_probe_order() {
        // Probe order over 5 slots: 0, 2, 4, 1, 3.
        let slots = [Slot::row(0), Slot::EMPTY, Slot::row(1), Slot::EMPTY, Slot::row(2)];
        assert_eq!(SlotStats::collect(&slots).longest_run, 3);
    }

    #[test]
    fn test_longest_run_wraps() {
        // Probe order: 0, 2, 4, 1, 3 -> occupied, empty, occupied, occupied, occupied.
        let slots = [Slot::row(0), Slot::row(1), Slot::EMPTY, Slot::row(2), Slot::row(3)];
        assert_eq!(SlotStats::collect(&slots).longest_run, 4);
    }

    #[test]
    fn test_empty_map() {
        let stats = SlotStats::collect(&[]);
        assert_eq!(stats, SlotStats::default());
        assert_eq!(stats.load_factor(), 0.0);
    }
}
