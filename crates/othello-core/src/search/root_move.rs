use arrayvec::ArrayVec;

use crate::constants::{MAX_PLY, SCORE_INF};
use crate::square::Square;
use crate::types::Score;

/// One legal root move with its running search results.
#[derive(Clone, Debug)]
pub struct RootMove {
    pub sq: Square,
    /// Score from the current iteration, or `-SCORE_INF` when the move has
    /// only been refuted so far.
    pub score: Score,
    /// Score from the previous completed iteration, seeds the aspiration
    /// window.
    pub previous_score: Score,
    /// Principal variation starting with this move.
    pub pv: ArrayVec<Square, MAX_PLY>,
    /// Whether an exact result for this move was already produced at the
    /// current depth (endgame root bookkeeping).
    pub searched: bool,
}

impl RootMove {
    pub fn new(sq: Square) -> RootMove {
        RootMove {
            sq,
            score: -SCORE_INF,
            previous_score: -SCORE_INF,
            pv: ArrayVec::new(),
            searched: false,
        }
    }
}
