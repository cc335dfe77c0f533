//! Shared transposition table.
//!
//! Entries live in 4-way clusters and carry a score *bound pair* plus the
//! two best moves, a draft (depth, selectivity), a work estimate and a date
//! used for aging. A spinlock array with one lock per cluster group
//! serializes all accesses that can collide; critical sections only copy a
//! few words and are never held across recursion.
//!
//! The same structure doubles as the PV table that records exact scores
//! near the root.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};

use aligned_vec::{AVec, ConstAlign};
use lock_api::RawMutex;

use crate::constants::SCORE_INF;
use crate::square::Square;
use crate::types::{Depth, Score, Selectivity};
use crate::util::spinlock::RawSpinLock;

/// Entries per cluster.
pub const HASH_N_WAY: usize = 4;

/// One lock guards `1 << LOCK_SHIFT` clusters.
const LOCK_SHIFT: usize = 8;

/// Weight of entry age in the replacement priority.
const AGE_WEIGHT: i32 = 8;

/// Decoded entry payload returned by [`TranspositionTable::probe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashData {
    pub depth: Depth,
    pub selectivity: Selectivity,
    /// log2 of the subtree size that produced this entry.
    pub cost: u32,
    pub date: u8,
    pub lower: Score,
    pub upper: Score,
    pub move1: Square,
    pub move2: Square,
}

impl HashData {
    /// True when the stored draft covers a search of `depth` at
    /// `selectivity`.
    #[inline]
    pub fn covers(&self, depth: Depth, selectivity: Selectivity) -> bool {
        self.depth >= depth && self.selectivity >= selectivity
    }
}

#[derive(Clone, Copy)]
struct Slot {
    key: u64,
    lower: i16,
    upper: i16,
    depth: u8,
    selectivity: u8,
    cost: u8,
    /// 0 marks a vacant slot; live dates are 1..=255.
    date: u8,
    move1: u8,
    move2: u8,
}

const VACANT: Slot = Slot {
    key: 0,
    lower: -SCORE_INF as i16,
    upper: SCORE_INF as i16,
    depth: 0,
    selectivity: 0,
    cost: 0,
    date: 0,
    move1: Square::None as u8,
    move2: Square::None as u8,
};

impl Slot {
    #[inline]
    fn decode(&self) -> HashData {
        HashData {
            depth: self.depth as Depth,
            selectivity: self.selectivity,
            cost: self.cost as u32,
            date: self.date,
            lower: self.lower as Score,
            upper: self.upper as Score,
            move1: Square::from_u8_unchecked(self.move1),
            move2: Square::from_u8_unchecked(self.move2),
        }
    }

    /// Replacement priority: smaller is evicted first. Vacant slots always
    /// lose; otherwise older, shallower and cheaper entries go before
    /// fresh deep ones.
    #[inline]
    fn keep_priority(&self, date: u8) -> i32 {
        if self.date == 0 {
            return i32::MIN;
        }
        let age = date.wrapping_sub(self.date) as i32;
        self.depth as i32 + self.cost as i32 / 2 - age * AGE_WEIGHT
    }

    /// Records `mv` as the primary move, demoting a different previous one.
    #[inline]
    fn push_move(&mut self, mv: Square) {
        if mv != Square::None && self.move1 != mv as u8 {
            self.move2 = self.move1;
            self.move1 = mv as u8;
        }
    }
}

struct Cluster(UnsafeCell<[Slot; HASH_N_WAY]>);

unsafe impl Sync for Cluster {}

struct LockGuard<'a> {
    lock: &'a RawSpinLock,
}

impl<'a> LockGuard<'a> {
    #[inline]
    fn new(lock: &'a RawSpinLock) -> LockGuard<'a> {
        lock.lock();
        LockGuard { lock }
    }
}

impl Drop for LockGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.lock.unlock() };
    }
}

/// The shared, dated, 4-way transposition cache.
pub struct TranspositionTable {
    clusters: AVec<Cluster, ConstAlign<64>>,
    locks: Box<[RawSpinLock]>,
    cluster_mask: usize,
    date: AtomicU8,
}

impl TranspositionTable {
    /// Allocates the largest power-of-two cluster count fitting `mb_size`
    /// mebibytes (at least 16 clusters).
    pub fn new(mb_size: usize) -> TranspositionTable {
        let cluster_bytes = std::mem::size_of::<Cluster>();
        let budget = mb_size.saturating_mul(1024 * 1024);
        let mut cluster_count = 16usize;
        while cluster_count * 2 * cluster_bytes <= budget {
            cluster_count *= 2;
        }

        let lock_count = (cluster_count >> LOCK_SHIFT).max(1);
        let locks = (0..lock_count)
            .map(|_| RawSpinLock::INIT)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        TranspositionTable {
            clusters: AVec::from_iter(
                64,
                (0..cluster_count).map(|_| Cluster(UnsafeCell::new([VACANT; HASH_N_WAY]))),
            ),
            locks,
            cluster_mask: cluster_count - 1,
            date: AtomicU8::new(1),
        }
    }

    /// Current date (generation) of the table.
    #[inline]
    pub fn date(&self) -> u8 {
        self.date.load(Ordering::Relaxed)
    }

    /// Starts a new search root: bumps the date, clearing everything when
    /// the 8-bit counter wraps so stale entries can never look fresh.
    pub fn increment_date(&self) {
        let next = self.date.load(Ordering::Relaxed).wrapping_add(1);
        if next == 0 {
            self.clear();
        } else {
            self.date.store(next, Ordering::Relaxed);
        }
    }

    /// Empties the table and resets the date.
    pub fn clear(&self) {
        for i in 0..self.clusters.len() {
            let _guard = self.lock_for(i);
            let slots = unsafe { &mut *self.clusters[i].0.get() };
            *slots = [VACANT; HASH_N_WAY];
        }
        self.date.store(1, Ordering::Relaxed);
    }

    #[inline]
    fn cluster_index(&self, key: u64) -> usize {
        // mix the high bits down so the mask sees the whole key
        ((key ^ (key >> 32)) as usize) & self.cluster_mask
    }

    #[inline]
    fn lock_for(&self, cluster_idx: usize) -> LockGuard<'_> {
        LockGuard::new(&self.locks[cluster_idx >> LOCK_SHIFT & (self.locks.len() - 1)])
    }

    /// Hints the CPU to fetch the cluster of `key`.
    #[inline]
    pub fn prefetch(&self, key: u64) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            let idx = self.cluster_index(key);
            let addr = self.clusters.as_ptr().add(idx) as *const i8;
            std::arch::x86_64::_mm_prefetch(addr, std::arch::x86_64::_MM_HINT_T0);
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = key;
        }
    }

    /// Looks up `key`, copying the entry out under the cluster lock.
    pub fn probe(&self, key: u64) -> Option<HashData> {
        let idx = self.cluster_index(key);
        let _guard = self.lock_for(idx);
        let slots = unsafe { &*self.clusters[idx].0.get() };
        slots
            .iter()
            .find(|slot| slot.date != 0 && slot.key == key)
            .map(Slot::decode)
    }

    /// Stores a search result. `score` against the `(alpha, beta)` window
    /// decides which bound is proven:
    /// a fail-high proves `lower = score`, a fail-low proves
    /// `upper = score`, and an exact score pins both.
    ///
    /// A matching entry of identical draft has its bounds intersected; a
    /// deeper same-position entry is refreshed but never weakened.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        key: u64,
        cost: u32,
        depth: Depth,
        selectivity: Selectivity,
        alpha: Score,
        beta: Score,
        score: Score,
        mv: Square,
    ) {
        let (lower, upper) = bounds_from_window(alpha, beta, score);
        let date = self.date();
        let idx = self.cluster_index(key);
        let _guard = self.lock_for(idx);
        let slots = unsafe { &mut *self.clusters[idx].0.get() };

        if let Some(slot) = slots.iter_mut().find(|s| s.date != 0 && s.key == key) {
            if slot.depth as Depth == depth && slot.selectivity == selectivity {
                // same draft: intersect the proven bounds; contradictory
                // writes (selective search noise) fall back to the newest
                let merged_lower = slot.lower.max(lower as i16);
                let merged_upper = slot.upper.min(upper as i16);
                if merged_lower <= merged_upper {
                    slot.lower = merged_lower;
                    slot.upper = merged_upper;
                } else {
                    slot.lower = lower as i16;
                    slot.upper = upper as i16;
                }
            } else if depth > slot.depth as Depth
                || (depth == slot.depth as Depth && selectivity > slot.selectivity)
            {
                slot.lower = lower as i16;
                slot.upper = upper as i16;
                slot.depth = depth as u8;
                slot.selectivity = selectivity;
                slot.cost = cost.min(255) as u8;
            }
            // a shallower write never evicts the deeper data, but the entry
            // stays current
            slot.date = date;
            if score > alpha {
                slot.push_move(mv);
            }
            return;
        }

        let victim = slots
            .iter_mut()
            .min_by_key(|s| s.keep_priority(date))
            .unwrap();
        *victim = Slot {
            key,
            lower: lower as i16,
            upper: upper as i16,
            depth: depth as u8,
            selectivity,
            cost: cost.min(255) as u8,
            date,
            move1: mv as u8,
            move2: Square::None as u8,
        };
    }

    /// Unconditionally (re)writes the entry for `key`, used after a
    /// completed full-window search whose result supersedes whatever the
    /// table holds.
    #[allow(clippy::too_many_arguments)]
    pub fn force_store(
        &self,
        key: u64,
        cost: u32,
        depth: Depth,
        selectivity: Selectivity,
        alpha: Score,
        beta: Score,
        score: Score,
        mv: Square,
    ) {
        let (lower, upper) = bounds_from_window(alpha, beta, score);
        let date = self.date();
        let idx = self.cluster_index(key);
        let _guard = self.lock_for(idx);
        let slots = unsafe { &mut *self.clusters[idx].0.get() };

        let slot = match slots.iter_mut().find(|s| s.date != 0 && s.key == key) {
            Some(slot) => slot,
            None => slots
                .iter_mut()
                .min_by_key(|s| s.keep_priority(date))
                .unwrap(),
        };
        let keep_move2 = if slot.key == key && slot.move1 != mv as u8 {
            slot.move1
        } else {
            slot.move2
        };
        *slot = Slot {
            key,
            lower: lower as i16,
            upper: upper as i16,
            depth: depth as u8,
            selectivity,
            cost: cost.min(255) as u8,
            date,
            move1: mv as u8,
            move2: keep_move2,
        };
    }

    /// Lightweight store used to seed the table (e.g. from an opening
    /// book): only writes when it would not overwrite deeper data.
    pub fn feed(
        &self,
        key: u64,
        depth: Depth,
        selectivity: Selectivity,
        lower: Score,
        upper: Score,
        mv: Square,
    ) {
        let date = self.date();
        let idx = self.cluster_index(key);
        let _guard = self.lock_for(idx);
        let slots = unsafe { &mut *self.clusters[idx].0.get() };

        if let Some(slot) = slots.iter_mut().find(|s| s.date != 0 && s.key == key) {
            if (slot.depth as Depth) <= depth {
                slot.lower = lower as i16;
                slot.upper = upper as i16;
                slot.depth = depth as u8;
                slot.selectivity = selectivity;
                slot.date = date;
                slot.push_move(mv);
            }
            return;
        }

        let victim = slots
            .iter_mut()
            .min_by_key(|s| s.keep_priority(date))
            .unwrap();
        *victim = Slot {
            key,
            lower: lower as i16,
            upper: upper as i16,
            depth: depth as u8,
            selectivity,
            cost: 0,
            date,
            move1: mv as u8,
            move2: Square::None as u8,
        };
    }

    /// Drops `mv` from the stored move slots of `key`, so a re-search will
    /// not try it first again (root multi-PV support).
    pub fn exclude_move(&self, key: u64, mv: Square) {
        let idx = self.cluster_index(key);
        let _guard = self.lock_for(idx);
        let slots = unsafe { &mut *self.clusters[idx].0.get() };
        if let Some(slot) = slots.iter_mut().find(|s| s.date != 0 && s.key == key) {
            if slot.move1 == mv as u8 {
                slot.move1 = slot.move2;
                slot.move2 = Square::None as u8;
            } else if slot.move2 == mv as u8 {
                slot.move2 = Square::None as u8;
            }
        }
    }

    /// Entry-wise copy into `dst`, which must have the same geometry.
    /// Used to promote the scratch table into the PV table.
    pub fn copy_to(&self, dst: &TranspositionTable) {
        assert_eq!(
            self.cluster_mask, dst.cluster_mask,
            "hash copy requires identical table sizes"
        );
        for i in 0..self.clusters.len() {
            let snapshot = {
                let _guard = self.lock_for(i);
                *unsafe { &*self.clusters[i].0.get() }
            };
            let _guard = dst.lock_for(i);
            unsafe { *dst.clusters[i].0.get() = snapshot };
        }
        dst.date.store(self.date(), Ordering::Relaxed);
    }
}

/// Bound pair proven by `score` against an `(alpha, beta)` window.
#[inline]
fn bounds_from_window(alpha: Score, beta: Score, score: Score) -> (Score, Score) {
    let lower = if score > alpha { score } else { -SCORE_INF };
    let upper = if score < beta { score } else { SCORE_INF };
    (lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TranspositionTable {
        TranspositionTable::new(1)
    }

    #[test]
    fn test_store_probe_round_trip() {
        let tt = table();
        let key = 0x0123_4567_89AB_CDEF;
        tt.store(key, 12, 10, 0, -4, 6, 2, Square::D4);

        let data = tt.probe(key).unwrap();
        assert_eq!(data.depth, 10);
        assert_eq!(data.selectivity, 0);
        assert_eq!(data.lower, 2);
        assert_eq!(data.upper, 2);
        assert_eq!(data.move1, Square::D4);
        assert!(data.lower <= data.upper);
    }

    #[test]
    fn test_miss_returns_none() {
        let tt = table();
        assert!(tt.probe(0xDEAD_BEEF).is_none());
    }

    #[test]
    fn test_fail_high_stores_lower_bound() {
        let tt = table();
        let key = 42;
        // score >= beta: only a lower bound is proven
        tt.store(key, 4, 8, 6, -2, 6, 6, Square::C3);
        let data = tt.probe(key).unwrap();
        assert_eq!(data.lower, 6);
        assert_eq!(data.upper, SCORE_INF);
    }

    #[test]
    fn test_fail_low_stores_upper_bound() {
        let tt = table();
        let key = 43;
        tt.store(key, 4, 8, 6, -2, 6, -2, Square::None);
        let data = tt.probe(key).unwrap();
        assert_eq!(data.lower, -SCORE_INF);
        assert_eq!(data.upper, -2);
    }

    #[test]
    fn test_same_draft_bounds_merge() {
        let tt = table();
        let key = 7;
        tt.store(key, 4, 8, 6, -64, 3, 3, Square::A1); // lower >= 3
        tt.store(key, 4, 8, 6, 5, 64, 5, Square::None); // upper <= 5
        let data = tt.probe(key).unwrap();
        assert_eq!(data.lower, 3);
        assert_eq!(data.upper, 5);
        assert!(data.lower <= data.upper);
        assert_eq!(data.move1, Square::A1);
    }

    #[test]
    fn test_deeper_write_replaces_shallower() {
        let tt = table();
        let key = 99;
        tt.store(key, 2, 6, 6, -64, 64, 1, Square::B2);
        tt.store(key, 8, 12, 6, -64, 64, 4, Square::C4);
        let data = tt.probe(key).unwrap();
        assert_eq!(data.depth, 12);
        assert_eq!(data.lower, 4);
        assert_eq!(data.move1, Square::C4);
        assert_eq!(data.move2, Square::B2);
    }

    #[test]
    fn test_shallower_write_preserves_deep_entry() {
        let tt = table();
        let key = 100;
        tt.store(key, 8, 12, 6, -64, 64, 4, Square::C4);
        tt.store(key, 2, 6, 6, -64, 64, -10, Square::B2);
        let data = tt.probe(key).unwrap();
        assert_eq!(data.depth, 12);
        assert_eq!(data.lower, 4);
        assert_eq!(data.upper, 4);
    }

    #[test]
    fn test_force_store_overwrites() {
        let tt = table();
        let key = 5;
        tt.store(key, 8, 12, 6, -64, 64, 4, Square::C4);
        tt.force_store(key, 2, 6, 6, -64, 64, -10, Square::B2);
        let data = tt.probe(key).unwrap();
        assert_eq!(data.depth, 6);
        assert_eq!(data.lower, -10);
        assert_eq!(data.move1, Square::B2);
        assert_eq!(data.move2, Square::C4);
    }

    #[test]
    fn test_exclude_move() {
        let tt = table();
        let key = 11;
        tt.store(key, 4, 8, 6, -64, 64, 2, Square::D4);
        tt.exclude_move(key, Square::D4);
        let data = tt.probe(key).unwrap();
        assert_eq!(data.move1, Square::None);
    }

    #[test]
    fn test_clear_empties_table() {
        let tt = table();
        tt.store(1, 4, 8, 6, -64, 64, 2, Square::D4);
        tt.clear();
        assert!(tt.probe(1).is_none());
    }

    #[test]
    fn test_copy_to() {
        let src = table();
        let dst = table();
        src.store(77, 4, 8, 6, -64, 64, 2, Square::E6);
        src.copy_to(&dst);
        assert_eq!(dst.probe(77), src.probe(77));
    }

    #[test]
    fn test_aged_entries_evicted_first() {
        let tt = table();
        // Find keys colliding into one cluster.
        let base_idx = tt.cluster_index(0);
        let mut keys = Vec::new();
        let mut k = 0u64;
        while keys.len() < HASH_N_WAY + 1 {
            if tt.cluster_index(k) == base_idx {
                keys.push(k);
            }
            k += 1;
        }

        // Fill the cluster with deep entries at date 1.
        for &key in keys.iter().take(HASH_N_WAY) {
            tt.store(key, 20, 20, 6, -64, 64, 0, Square::A1);
        }
        // Age the table, then insert a shallow entry: it must displace one
        // of the stale deep entries rather than being dropped.
        for _ in 0..4 {
            tt.increment_date();
        }
        let fresh = keys[HASH_N_WAY];
        tt.store(fresh, 1, 2, 6, -64, 64, 0, Square::B1);
        assert!(tt.probe(fresh).is_some());
    }

    #[test]
    fn test_concurrent_stores_keep_invariants() {
        use std::sync::Arc;

        let tt = Arc::new(table());
        let key = 0xABCD_EF01_2345_6789;
        let mut handles = Vec::new();
        for t in 0..4 {
            let tt = tt.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..1000 {
                    let score = ((t * 7 + i) % 32) as Score - 16;
                    tt.store(key, 4, 8, 6, -64, 64, score, Square::D4);
                    if let Some(data) = tt.probe(key) {
                        assert!(data.lower <= data.upper);
                        assert_eq!(data.depth, 8);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
