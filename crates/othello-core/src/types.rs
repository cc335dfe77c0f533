//! Common type aliases used throughout the engine.

/// Remaining search depth in plies.
pub type Depth = u32;

/// Score value. Disc difference in the endgame, scaled by
/// [`crate::constants::EVAL_SCORE_SCALE`] in the midgame.
pub type Score = i32;

/// Floating-point score reported to drivers.
pub type Scoref = f32;

/// Selectivity level, `0` (most aggressive pruning) to
/// [`crate::probcut::NO_SELECTIVITY`] (exact).
pub type Selectivity = u8;
