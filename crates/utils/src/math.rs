//! Small arithmetic helpers

use std::io::IoSlice;

/// Smallest power of two not below `n`.
///
/// Returns 0 for 0 and when the result would not fit in a `usize`.
pub fn next_pow2(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    n.checked_next_power_of_two().unwrap_or(0)
}

/// Total length of a scatter/gather list.
pub fn iovec_sum(slices: &[IoSlice<'_>]) -> usize {
    slices.iter().map(|slice| slice.len()).sum()
}
