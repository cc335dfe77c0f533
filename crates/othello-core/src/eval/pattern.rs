//! Pattern feature extraction.
//!
//! Each feature reads 3..10 squares and encodes them as a base-3 number
//! (0 = player disc, 1 = opponent disc, 2 = empty), most significant digit
//! first. The per-ply feature vectors are kept for both perspectives in a
//! stack indexed by ply, so undoing a move is just stepping back one level.

use crate::bitboard::{self, BitboardIterator};
use crate::board::Board;
use crate::constants::MAX_PLY;
use crate::search::side_to_move::SideToMove;
use crate::square::Square;

/// Number of evaluated features: 46 geometric patterns plus one bias.
pub const EVAL_N_FEATURE: usize = 47;

/// Number of geometric (board-reading) features.
pub const N_GEOMETRIC_FEATURES: usize = 46;

/// Feature vector length, padded for alignment.
pub const FEATURE_VECTOR_LEN: usize = 48;

/// Most features any single square participates in.
const MAX_FEATURES_PER_SQUARE: usize = 8;

type Sq = Square;

/// The squares one feature reads, most significant digit first.
#[derive(Debug, Clone, Copy)]
pub struct FeatureToCoordinate {
    pub n_square: usize,
    pub squares: [Square; 10],
}

macro_rules! ftc {
    ($n:expr, [$($sq:expr),* $(,)?]) => {
        FeatureToCoordinate { n_square: $n, squares: [$($sq),*] }
    };
}

/// Geometric feature layout. Instances of one pattern type are listed with
/// corresponding square orders so that they can share a weight table.
#[rustfmt::skip]
pub const EVAL_F2X: [FeatureToCoordinate; N_GEOMETRIC_FEATURES] = [
    // edge + 2X
    ftc!(10, [Sq::A1, Sq::B1, Sq::C1, Sq::D1, Sq::E1, Sq::F1, Sq::G1, Sq::H1, Sq::B2, Sq::G2]),
    ftc!(10, [Sq::A8, Sq::B8, Sq::C8, Sq::D8, Sq::E8, Sq::F8, Sq::G8, Sq::H8, Sq::B7, Sq::G7]),
    ftc!(10, [Sq::A1, Sq::A2, Sq::A3, Sq::A4, Sq::A5, Sq::A6, Sq::A7, Sq::A8, Sq::B2, Sq::B7]),
    ftc!(10, [Sq::H1, Sq::H2, Sq::H3, Sq::H4, Sq::H5, Sq::H6, Sq::H7, Sq::H8, Sq::G2, Sq::G7]),

    // corner 3x3
    ftc!(9, [Sq::A1, Sq::B1, Sq::C1, Sq::A2, Sq::B2, Sq::C2, Sq::A3, Sq::B3, Sq::C3, Sq::None]),
    ftc!(9, [Sq::H1, Sq::G1, Sq::F1, Sq::H2, Sq::G2, Sq::F2, Sq::H3, Sq::G3, Sq::F3, Sq::None]),
    ftc!(9, [Sq::A8, Sq::B8, Sq::C8, Sq::A7, Sq::B7, Sq::C7, Sq::A6, Sq::B6, Sq::C6, Sq::None]),
    ftc!(9, [Sq::H8, Sq::G8, Sq::F8, Sq::H7, Sq::G7, Sq::F7, Sq::H6, Sq::G6, Sq::F6, Sq::None]),

    // corner 2x5
    ftc!(10, [Sq::A1, Sq::B1, Sq::C1, Sq::D1, Sq::E1, Sq::A2, Sq::B2, Sq::C2, Sq::D2, Sq::E2]),
    ftc!(10, [Sq::H1, Sq::G1, Sq::F1, Sq::E1, Sq::D1, Sq::H2, Sq::G2, Sq::F2, Sq::E2, Sq::D2]),
    ftc!(10, [Sq::A8, Sq::B8, Sq::C8, Sq::D8, Sq::E8, Sq::A7, Sq::B7, Sq::C7, Sq::D7, Sq::E7]),
    ftc!(10, [Sq::H8, Sq::G8, Sq::F8, Sq::E8, Sq::D8, Sq::H7, Sq::G7, Sq::F7, Sq::E7, Sq::D7]),

    // rows/columns 2
    ftc!(8, [Sq::A2, Sq::B2, Sq::C2, Sq::D2, Sq::E2, Sq::F2, Sq::G2, Sq::H2, Sq::None, Sq::None]),
    ftc!(8, [Sq::A7, Sq::B7, Sq::C7, Sq::D7, Sq::E7, Sq::F7, Sq::G7, Sq::H7, Sq::None, Sq::None]),
    ftc!(8, [Sq::B1, Sq::B2, Sq::B3, Sq::B4, Sq::B5, Sq::B6, Sq::B7, Sq::B8, Sq::None, Sq::None]),
    ftc!(8, [Sq::G1, Sq::G2, Sq::G3, Sq::G4, Sq::G5, Sq::G6, Sq::G7, Sq::G8, Sq::None, Sq::None]),

    // rows/columns 3
    ftc!(8, [Sq::A3, Sq::B3, Sq::C3, Sq::D3, Sq::E3, Sq::F3, Sq::G3, Sq::H3, Sq::None, Sq::None]),
    ftc!(8, [Sq::A6, Sq::B6, Sq::C6, Sq::D6, Sq::E6, Sq::F6, Sq::G6, Sq::H6, Sq::None, Sq::None]),
    ftc!(8, [Sq::C1, Sq::C2, Sq::C3, Sq::C4, Sq::C5, Sq::C6, Sq::C7, Sq::C8, Sq::None, Sq::None]),
    ftc!(8, [Sq::F1, Sq::F2, Sq::F3, Sq::F4, Sq::F5, Sq::F6, Sq::F7, Sq::F8, Sq::None, Sq::None]),

    // rows/columns 4
    ftc!(8, [Sq::A4, Sq::B4, Sq::C4, Sq::D4, Sq::E4, Sq::F4, Sq::G4, Sq::H4, Sq::None, Sq::None]),
    ftc!(8, [Sq::A5, Sq::B5, Sq::C5, Sq::D5, Sq::E5, Sq::F5, Sq::G5, Sq::H5, Sq::None, Sq::None]),
    ftc!(8, [Sq::D1, Sq::D2, Sq::D3, Sq::D4, Sq::D5, Sq::D6, Sq::D7, Sq::D8, Sq::None, Sq::None]),
    ftc!(8, [Sq::E1, Sq::E2, Sq::E3, Sq::E4, Sq::E5, Sq::E6, Sq::E7, Sq::E8, Sq::None, Sq::None]),

    // main diagonals
    ftc!(8, [Sq::A1, Sq::B2, Sq::C3, Sq::D4, Sq::E5, Sq::F6, Sq::G7, Sq::H8, Sq::None, Sq::None]),
    ftc!(8, [Sq::H1, Sq::G2, Sq::F3, Sq::E4, Sq::D5, Sq::C6, Sq::B7, Sq::A8, Sq::None, Sq::None]),

    // diagonals of 7
    ftc!(7, [Sq::B1, Sq::C2, Sq::D3, Sq::E4, Sq::F5, Sq::G6, Sq::H7, Sq::None, Sq::None, Sq::None]),
    ftc!(7, [Sq::A2, Sq::B3, Sq::C4, Sq::D5, Sq::E6, Sq::F7, Sq::G8, Sq::None, Sq::None, Sq::None]),
    ftc!(7, [Sq::G1, Sq::F2, Sq::E3, Sq::D4, Sq::C5, Sq::B6, Sq::A7, Sq::None, Sq::None, Sq::None]),
    ftc!(7, [Sq::H2, Sq::G3, Sq::F4, Sq::E5, Sq::D6, Sq::C7, Sq::B8, Sq::None, Sq::None, Sq::None]),

    // diagonals of 6
    ftc!(6, [Sq::C1, Sq::D2, Sq::E3, Sq::F4, Sq::G5, Sq::H6, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(6, [Sq::A3, Sq::B4, Sq::C5, Sq::D6, Sq::E7, Sq::F8, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(6, [Sq::F1, Sq::E2, Sq::D3, Sq::C4, Sq::B5, Sq::A6, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(6, [Sq::H3, Sq::G4, Sq::F5, Sq::E6, Sq::D7, Sq::C8, Sq::None, Sq::None, Sq::None, Sq::None]),

    // diagonals of 5
    ftc!(5, [Sq::D1, Sq::E2, Sq::F3, Sq::G4, Sq::H5, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(5, [Sq::A4, Sq::B5, Sq::C6, Sq::D7, Sq::E8, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(5, [Sq::E1, Sq::D2, Sq::C3, Sq::B4, Sq::A5, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(5, [Sq::H4, Sq::G5, Sq::F6, Sq::E7, Sq::D8, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),

    // diagonals of 4
    ftc!(4, [Sq::E1, Sq::F2, Sq::G3, Sq::H4, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(4, [Sq::A5, Sq::B6, Sq::C7, Sq::D8, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(4, [Sq::D1, Sq::C2, Sq::B3, Sq::A4, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(4, [Sq::H5, Sq::G6, Sq::F7, Sq::E8, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),

    // diagonals of 3
    ftc!(3, [Sq::F1, Sq::G2, Sq::H3, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(3, [Sq::A6, Sq::B7, Sq::C8, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(3, [Sq::C1, Sq::B2, Sq::A3, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),
    ftc!(3, [Sq::H6, Sq::G7, Sq::F8, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None, Sq::None]),
];

/// Pattern type of each geometric feature; instances of one type share a
/// weight table.
#[rustfmt::skip]
pub const TYPE_OF_FEATURE: [usize; N_GEOMETRIC_FEATURES] = [
    0, 0, 0, 0,
    1, 1, 1, 1,
    2, 2, 2, 2,
    3, 3, 3, 3,
    4, 4, 4, 4,
    5, 5, 5, 5,
    6, 6,
    7, 7, 7, 7,
    8, 8, 8, 8,
    9, 9, 9, 9,
    10, 10, 10, 10,
    11, 11, 11, 11,
];

/// Number of pattern types.
pub const N_PATTERN_TYPES: usize = 12;

/// The base-3 digit weight of `board`'s single set bit within `feature`,
/// or 0 when the square does not belong to the feature.
const fn digit_weight(board: u64, feature: &FeatureToCoordinate) -> u32 {
    let mut multiplier = 0u32;
    let mut weight = 0u32;
    let mut i = feature.n_square;
    while i > 0 {
        i -= 1;
        let sq = feature.squares[i];
        multiplier = if multiplier == 0 { 1 } else { multiplier * 3 };
        if board & (1u64 << (sq as u8)) != 0 {
            weight = multiplier;
        }
    }
    weight
}

#[derive(Clone, Copy)]
struct SquareFeatures {
    n: usize,
    /// (feature index, digit weight) pairs.
    entries: [(u16, u16); MAX_FEATURES_PER_SQUARE],
}

/// Reverse map: which features each square participates in.
static SQUARE_FEATURES: [SquareFeatures; 64] = {
    let mut table = [SquareFeatures {
        n: 0,
        entries: [(0, 0); MAX_FEATURES_PER_SQUARE],
    }; 64];
    let mut sq = 0;
    while sq < 64 {
        let board = 1u64 << sq;
        let mut n = 0;
        let mut f = 0;
        while f < N_GEOMETRIC_FEATURES {
            let w = digit_weight(board, &EVAL_F2X[f]);
            if w > 0 {
                assert!(n < MAX_FEATURES_PER_SQUARE);
                table[sq].entries[n] = (f as u16, w as u16);
                n += 1;
            }
            f += 1;
        }
        table[sq].n = n;
        sq += 1;
    }
    table
};

/// 0 for a player disc, 1 for an opponent disc, 2 for empty.
#[inline]
fn square_color(board: &Board, sq: Square) -> u16 {
    if bitboard::is_set(board.player, sq) {
        0
    } else if bitboard::is_set(board.opponent, sq) {
        1
    } else {
        2
    }
}

/// Recomputes the geometric feature vector of `board` from scratch.
pub fn set_features(board: &Board, features: &mut [u16; FEATURE_VECTOR_LEN]) {
    for (i, f2x) in EVAL_F2X.iter().enumerate() {
        let mut index = 0u16;
        for j in 0..f2x.n_square {
            index = index * 3 + square_color(board, f2x.squares[j]);
        }
        features[i] = index;
    }
}

/// Ply-stacked feature vectors for both perspectives.
///
/// A move writes the next ply level and leaves the current one untouched,
/// so unwinding the search needs no inverse delta.
pub struct FeatureSet {
    p_features: Box<[[u16; FEATURE_VECTOR_LEN]; MAX_PLY + 1]>,
    o_features: Box<[[u16; FEATURE_VECTOR_LEN]; MAX_PLY + 1]>,
}

impl FeatureSet {
    /// Builds the stack with `board`'s features at level `ply`.
    pub fn new(board: &Board, ply: usize) -> FeatureSet {
        let mut set = FeatureSet {
            p_features: vec![[0u16; FEATURE_VECTOR_LEN]; MAX_PLY + 1]
                .into_boxed_slice()
                .try_into()
                .ok()
                .unwrap(),
            o_features: vec![[0u16; FEATURE_VECTOR_LEN]; MAX_PLY + 1]
                .into_boxed_slice()
                .try_into()
                .ok()
                .unwrap(),
        };
        set_features(board, &mut set.p_features[ply]);
        set_features(&board.switch_players(), &mut set.o_features[ply]);
        set
    }

    /// Feature vector at `ply` for the given perspective.
    #[inline]
    pub fn features(&self, ply: usize, side: SideToMove) -> &[u16; FEATURE_VECTOR_LEN] {
        match side {
            SideToMove::Player => &self.p_features[ply],
            SideToMove::Opponent => &self.o_features[ply],
        }
    }

    /// Applies a move played from `ply` by `side`, producing the vectors at
    /// `ply + 1`. Only the features touching the move square or a flipped
    /// disc are adjusted.
    pub fn update(&mut self, sq: Square, flipped: u64, ply: usize, side: SideToMove) {
        self.p_features.copy_within(ply..ply + 1, ply + 1);
        self.o_features.copy_within(ply..ply + 1, ply + 1);
        let p_out = &mut self.p_features[ply + 1];
        let o_out = &mut self.o_features[ply + 1];

        let placed = &SQUARE_FEATURES[sq.index()];
        if side == SideToMove::Player {
            // empty (2) -> player (0) from P's view, -> opponent (1) from O's
            for &(f, w) in &placed.entries[..placed.n] {
                p_out[f as usize] -= 2 * w;
                o_out[f as usize] -= w;
            }
            for x in BitboardIterator::new(flipped) {
                let turned = &SQUARE_FEATURES[x.index()];
                for &(f, w) in &turned.entries[..turned.n] {
                    // opponent (1) -> player (0) / player (0) -> opponent (1)
                    p_out[f as usize] -= w;
                    o_out[f as usize] += w;
                }
            }
        } else {
            for &(f, w) in &placed.entries[..placed.n] {
                p_out[f as usize] -= w;
                o_out[f as usize] -= 2 * w;
            }
            for x in BitboardIterator::new(flipped) {
                let turned = &SQUARE_FEATURES[x.index()];
                for &(f, w) in &turned.entries[..turned.n] {
                    p_out[f as usize] += w;
                    o_out[f as usize] -= w;
                }
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flip;

    #[test]
    fn test_feature_sizes() {
        for (i, f) in EVAL_F2X.iter().enumerate() {
            assert!(f.n_square >= 3 && f.n_square <= 10, "feature {i}");
            for j in 0..f.n_square {
                assert_ne!(f.squares[j], Square::None, "feature {i} slot {j}");
            }
            for j in f.n_square..10 {
                assert_eq!(f.squares[j], Square::None, "feature {i} slot {j}");
            }
        }
    }

    #[test]
    fn test_reverse_map_agrees_with_layout() {
        for sq in Square::iter() {
            let entry = &SQUARE_FEATURES[sq.index()];
            let mut expected = 0;
            for (f, f2x) in EVAL_F2X.iter().enumerate() {
                let member = f2x.squares[..f2x.n_square].contains(&sq);
                if member {
                    expected += 1;
                    assert!(
                        entry.entries[..entry.n].iter().any(|&(fi, _)| fi as usize == f),
                        "square {sq} missing feature {f}"
                    );
                }
            }
            assert_eq!(entry.n, expected, "square {sq}");
        }
    }

    #[test]
    fn test_initial_features_in_range() {
        let mut features = [0u16; FEATURE_VECTOR_LEN];
        set_features(&Board::new(), &mut features);
        for (i, f2x) in EVAL_F2X.iter().enumerate() {
            let max = 3u32.pow(f2x.n_square as u32) as u16;
            assert!(features[i] < max, "feature {i} out of range");
        }
    }

    #[test]
    fn test_incremental_update_matches_recompute() {
        let mut board = Board::new();
        let mut side = SideToMove::Player;
        let mut set = FeatureSet::new(&board, 0);

        for (ply, mv) in [Square::D3, Square::C5, Square::E6, Square::F5, Square::C4]
            .into_iter()
            .enumerate()
        {
            let flipped = flip::flip(mv, board.player, board.opponent);
            set.update(mv, flipped, ply, side);
            board = board.make_move_with_flipped(flipped, mv);
            side = side.switch();

            // The stack's player perspective follows the root player, so
            // compare against the root-player view of the new position.
            let root_view = if side == SideToMove::Player {
                board
            } else {
                board.switch_players()
            };
            let fresh = FeatureSet::new(&root_view, ply + 1);
            assert_eq!(
                set.features(ply + 1, SideToMove::Player)[..N_GEOMETRIC_FEATURES],
                fresh.features(ply + 1, SideToMove::Player)[..N_GEOMETRIC_FEATURES],
                "player features diverged after {mv} at ply {ply}"
            );
            assert_eq!(
                set.features(ply + 1, SideToMove::Opponent)[..N_GEOMETRIC_FEATURES],
                fresh.features(ply + 1, SideToMove::Opponent)[..N_GEOMETRIC_FEATURES],
                "opponent features diverged after {mv} at ply {ply}"
            );
        }
    }
}
