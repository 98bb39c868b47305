//! Prefix-table search shared by the archive index readers.
//!
//! Tables are sorted by prefix. A lookup binary-searches for the first slot
//! holding the target prefix, then walks the run of equal prefixes comparing
//! suffixes.

use crate::hash::{Hash, Suffix};

/// Index of the first slot whose prefix is `>= target`.
pub fn lower_bound(len: usize, target: u64, prefix_at: impl Fn(usize) -> u64) -> usize {
    let (mut lo, mut hi) = (0usize, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if prefix_at(mid) < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Find the slot holding `hash`, if any.
pub fn find(
    len: usize,
    hash: &Hash,
    prefix_at: impl Fn(usize) -> u64,
    suffix_at: impl Fn(usize) -> Suffix,
) -> Option<usize> {
    let prefix = hash.prefix();
    let suffix = hash.suffix();
    let mut idx = lower_bound(len, prefix, &prefix_at);
    while idx < len && prefix_at(idx) == prefix {
        if suffix_at(idx) == suffix {
            return Some(idx);
        }
        idx += 1;
    }
    None
}
