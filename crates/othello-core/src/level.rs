//! Strength levels: each level fixes a midgame depth and, per selectivity
//! step, the number of empties from which the endgame is solved.

use crate::probcut::NO_SELECTIVITY;
use crate::types::{Depth, Selectivity};

/// Search schedule of one strength level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Level {
    /// Midgame search depth.
    pub mid_depth: Depth,
    /// Endgame solve horizon per selectivity, index 0 = most selective,
    /// index `NO_SELECTIVITY` = exact.
    pub end_depth: [Depth; NO_SELECTIVITY as usize + 1],
}

impl Level {
    /// Endgame horizon at `selectivity`.
    #[inline]
    pub fn get_end_depth(&self, selectivity: Selectivity) -> Depth {
        self.end_depth[selectivity as usize]
    }

    /// Full-strength schedule: solve everything exactly.
    pub fn exact() -> Level {
        Level {
            mid_depth: 60,
            end_depth: [60; NO_SELECTIVITY as usize + 1],
        }
    }
}

/// Highest configurable level.
pub const MAX_LEVEL: usize = 60;

/// Looks up the schedule for `lv`.
///
/// # Panics
///
/// Panics if `lv` exceeds [`MAX_LEVEL`]; level validation belongs to the
/// configuration layer.
pub fn get_level(lv: usize) -> Level {
    assert!(lv <= MAX_LEVEL, "invalid level {lv}, valid range is 0..={MAX_LEVEL}");
    LEVELS[lv]
}

/// Level table. Shallow levels solve `2 * level` empties exactly; from
/// level 11 on, the exact horizon grows by one empty every other level
/// while more selective passes reach a few empties deeper.
const LEVELS: [Level; MAX_LEVEL + 1] = build_levels();

const fn build_levels() -> [Level; MAX_LEVEL + 1] {
    let mut levels = [Level {
        mid_depth: 0,
        end_depth: [0; NO_SELECTIVITY as usize + 1],
    }; MAX_LEVEL + 1];

    let mut lv = 0;
    while lv <= MAX_LEVEL {
        let mid = if lv == 0 { 1 } else { lv as Depth };
        let mut end = [0 as Depth; NO_SELECTIVITY as usize + 1];

        if lv <= 10 {
            let solve = if lv == 0 { 1 } else { 2 * lv as Depth };
            let mut s = 0;
            while s < end.len() {
                end[s] = solve;
                s += 1;
            }
        } else {
            let exact = min_depth(21 + (lv as Depth - 11) / 2 + lv.saturating_sub(21) as Depth, 60);
            // widening gap for the more selective passes
            let gap = [5, 4, 3, 2, 2, 1, 0];
            let mut s = 0;
            while s < end.len() {
                end[s] = min_depth(exact + gap[s], 60);
                s += 1;
            }
        }

        levels[lv] = Level {
            mid_depth: mid,
            end_depth: end,
        };
        lv += 1;
    }

    levels
}

const fn min_depth(a: Depth, b: Depth) -> Depth {
    if a < b { a } else { b }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depths_monotone_in_level() {
        for lv in 0..MAX_LEVEL {
            let cur = get_level(lv);
            let next = get_level(lv + 1);
            assert!(next.mid_depth >= cur.mid_depth);
            assert!(next.end_depth[NO_SELECTIVITY as usize] >= cur.end_depth[NO_SELECTIVITY as usize]);
        }
    }

    #[test]
    fn test_selective_horizon_dominates_exact() {
        for lv in 0..=MAX_LEVEL {
            let level = get_level(lv);
            for s in 0..NO_SELECTIVITY as usize {
                assert!(level.end_depth[s] >= level.end_depth[s + 1]);
            }
        }
    }

    #[test]
    fn test_max_level_is_exact_everywhere() {
        let level = get_level(MAX_LEVEL);
        assert_eq!(level.mid_depth, 60);
        assert_eq!(level.get_end_depth(NO_SELECTIVITY), 60);
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_level_panics() {
        let _ = get_level(MAX_LEVEL + 1);
    }
}
