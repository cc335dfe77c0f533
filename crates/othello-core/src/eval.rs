//! Pattern-weighted midgame evaluation.
//!
//! The evaluator scores a position as the dot product of 47 pattern feature
//! indices with a ply-specific signed 16-bit weight row, in scaled-score
//! units (one disc = 128). Feature vectors are maintained incrementally by
//! the search; this module owns the weights and the symmetry packing.

pub mod pattern;
pub mod weights;

use std::path::Path;

use crate::constants::{EVAL_SCORE_SCALE, MID_SCORE_MAX, MID_SCORE_MIN};
use crate::types::Score;

pub use pattern::{FEATURE_VECTOR_LEN, FeatureSet};
pub use weights::{EVAL_N_PLY, EVAL_N_WEIGHT, EvalError};

use pattern::{N_GEOMETRIC_FEATURES, TYPE_OF_FEATURE};
use weights::{Packing, Weights};

/// Scores stay strictly inside the midgame range so that exact endgame
/// results always dominate.
const SCORE_CLAMP_MAX: Score = MID_SCORE_MAX - EVAL_SCORE_SCALE;
const SCORE_CLAMP_MIN: Score = MID_SCORE_MIN + EVAL_SCORE_SCALE;

/// The pattern evaluator: per-ply weights plus the packing tables mapping
/// raw feature indices to canonical weight entries.
pub struct Eval {
    weights: Weights,
    packing: Packing,
    /// Weight-row base offset of each geometric feature.
    feature_type: [usize; N_GEOMETRIC_FEATURES],
}

impl Eval {
    /// Loads weights from `path`, or falls back to zero weights when no
    /// path is configured. An unreadable or malformed configured file is a
    /// fatal configuration error surfaced to the caller.
    pub fn with_weight_file(path: Option<&Path>) -> Result<Eval, EvalError> {
        let weights = match path {
            Some(path) => Weights::load(path)?,
            None => Weights::zeroed(),
        };
        Ok(Self::from_weights(weights))
    }

    fn from_weights(weights: Weights) -> Eval {
        Eval {
            weights,
            packing: Packing::build(),
            feature_type: TYPE_OF_FEATURE,
        }
    }

    /// Scores a feature vector at `ply`. Positive is good for the side the
    /// vector was built for.
    pub fn score(&self, features: &[u16; FEATURE_VECTOR_LEN], ply: usize) -> Score {
        let row = self.weights.row(ply.min(EVAL_N_PLY - 1));
        let mut sum = row[self.packing.bias_index()] as Score;
        for f in 0..N_GEOMETRIC_FEATURES {
            let idx = self
                .packing
                .weight_index(self.feature_type[f], features[f] as usize);
            sum += row[idx] as Score;
        }
        sum.clamp(SCORE_CLAMP_MIN, SCORE_CLAMP_MAX)
    }

    /// Scores `board` directly, building the feature vector from scratch.
    /// Slower than [`Eval::score`]; used outside the search hot path.
    pub fn score_board(&self, board: &crate::board::Board) -> Score {
        let mut features = [0u16; FEATURE_VECTOR_LEN];
        pattern::set_features(board, &mut features);
        let ply = 60 - board.get_empty_count().min(60) as usize;
        self.score(&features, ply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::square::Square;

    /// Deterministic non-trivial weights for behavioral tests.
    fn patterned_eval() -> Eval {
        let values: Box<[i16]> = (0..EVAL_N_PLY * EVAL_N_WEIGHT)
            .map(|i| (i % 251) as i16 - 125)
            .collect();
        Eval::from_weights(Weights::from_values(values))
    }

    #[test]
    fn test_zero_weights_score_zero() {
        let eval = Eval::with_weight_file(None).unwrap();
        assert_eq!(eval.score_board(&Board::new()), 0);
    }

    #[test]
    fn test_score_is_clamped() {
        let eval = patterned_eval();
        let board = Board::new();
        let score = eval.score_board(&board);
        assert!(score >= SCORE_CLAMP_MIN && score <= SCORE_CLAMP_MAX);
    }

    #[test]
    fn test_score_invariant_under_mirror_symmetries() {
        // All pattern types are closed under the two mirror reflections
        // (and their composition), so the evaluation must not change.
        let eval = patterned_eval();
        let board = Board::new().make_move(Square::D3).make_move(Square::C5);
        let reference = eval.score_board(&board);
        for k in 1..4 {
            assert_eq!(
                eval.score_board(&board.symmetry(k)),
                reference,
                "symmetry {k}"
            );
        }
    }

    #[test]
    fn test_incremental_vector_scores_like_scratch() {
        let eval = patterned_eval();
        let board = Board::new().make_move(Square::D3);
        let set = FeatureSet::new(&board, 1);
        let from_set = eval.score(
            set.features(1, crate::search::side_to_move::SideToMove::Player),
            1,
        );
        assert_eq!(from_set, eval.score_board(&board));
    }
}
