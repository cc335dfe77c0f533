use crate::probcut;
use crate::square::Square;
use crate::types::{Depth, Scoref, Selectivity};

/// Outcome of one search run.
#[derive(Clone, Debug)]
pub struct SearchResult {
    /// Disc-difference score (fractional in the midgame).
    pub score: Scoref,
    pub best_move: Option<Square>,
    pub n_nodes: u64,
    pub pv_line: Vec<Square>,
    /// Depth actually reached.
    pub depth: Depth,
    pub selectivity: Selectivity,
    /// True when the score comes from the exact endgame solver.
    pub is_endgame: bool,
    /// Wall time of the run.
    pub time_ms: u64,
}

impl SearchResult {
    /// Confidence of the reported score, in percent.
    pub fn get_probability(&self) -> i32 {
        probcut::get_probability(self.selectivity)
    }
}
