//! Layout and probing constants shared by the store and the index.

/// Alignment of every buffer, in bytes. Capacities are kept at a multiple
/// of this value so that every column base stays aligned as well.
pub const ALIGNMENT: usize = 16;

/// Smallest non-zero row capacity.
pub const MIN_CAPACITY: usize = 16;

/// Distance between consecutive probe positions in the slot array.
///
/// The slot capacity is always odd, so an even stride visits every slot
/// exactly once before wrapping back to the start.
pub const PROBE_STRIDE: usize = 2;

/// Rounds `n` up to the next multiple of [`ALIGNMENT`].
///
/// Returns `None` on overflow.
#[inline]
pub const fn align_rows(n: usize) -> Option<usize> {
    match n.checked_add(ALIGNMENT - 1) {
        Some(v) => Some(v / ALIGNMENT * ALIGNMENT),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_rows() {
        assert_eq!(align_rows(0), Some(0));
        assert_eq!(align_rows(1), Some(16));
        assert_eq!(align_rows(16), Some(16));
        assert_eq!(align_rows(17), Some(32));
        assert_eq!(align_rows(usize::MAX), None);
    }

    #[test]
    fn test_stride_is_coprime_with_odd_capacity() {
        // 2n + 3 is odd for every n, so a stride of 2 cycles through all slots.
        for cap in [16usize, 32, 48, 1024] {
            let slots = 2 * cap + 3;
            let mut seen = vec![false; slots];
            let mut pos = 0;
            for _ in 0..slots {
                assert!(!seen[pos]);
                seen[pos] = true;
                pos = (pos + PROBE_STRIDE) % slots;
            }
            assert!(seen.iter().all(|s| *s));
        }
    }
}
