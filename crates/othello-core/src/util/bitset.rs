//! Small atomic id set used for split-point worker membership.

use std::sync::atomic::{AtomicU64, Ordering};

/// A set of up to 64 small ids backed by one atomic word.
#[derive(Default)]
pub struct AtomicBitSet {
    bits: AtomicU64,
}

impl AtomicBitSet {
    pub fn new() -> AtomicBitSet {
        AtomicBitSet {
            bits: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn set(&self, index: usize) {
        self.bits.fetch_or(1 << index, Ordering::Relaxed);
    }

    #[inline]
    pub fn reset(&self, index: usize) {
        self.bits.fetch_and(!(1 << index), Ordering::Relaxed);
    }

    #[inline]
    pub fn test(&self, index: usize) -> bool {
        self.bits.load(Ordering::Relaxed) & (1 << index) != 0
    }

    #[inline]
    pub fn none(&self) -> bool {
        self.bits.load(Ordering::Relaxed) == 0
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.bits.load(Ordering::Relaxed).count_ones()
    }

    #[inline]
    pub fn clear(&self) {
        self.bits.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reset_test() {
        let set = AtomicBitSet::new();
        assert!(set.none());

        set.set(3);
        set.set(17);
        assert!(set.test(3));
        assert!(set.test(17));
        assert!(!set.test(4));
        assert_eq!(set.count(), 2);

        set.reset(3);
        assert!(!set.test(3));
        assert_eq!(set.count(), 1);

        set.clear();
        assert!(set.none());
    }
}
