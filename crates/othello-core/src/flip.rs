//! Flip computation: which opponent discs turn when a move is played.
//!
//! Two backends share the same per-direction parallel-prefix fill: runs of
//! opponent discs adjacent to the move square are expanded in O(log n)
//! steps, then validated by requiring a friendly disc one step beyond the
//! run. The AVX2 variant evaluates four directions per register.

#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
mod avx2;
mod scalar;

use cfg_if::cfg_if;

use crate::square::Square;

/// Returns the mask of opponent discs flipped by playing `sq`.
///
/// Zero if and only if `sq` is not a legal move for the player (including
/// when `sq` is occupied).
#[inline(always)]
pub fn flip(sq: Square, player: u64, opponent: u64) -> u64 {
    cfg_if! {
        if #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))] {
            unsafe { avx2::flip(sq, player, opponent) }
        } else {
            scalar::flip(sq, player, opponent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitboard::{self, BitboardIterator};
    use crate::board::{Board, Piece};

    #[test]
    fn test_flip_initial_position() {
        let p = Square::D5.bitboard() | Square::E4.bitboard();
        let o = Square::D4.bitboard() | Square::E5.bitboard();
        assert_eq!(flip(Square::C4, p, o), Square::D4.bitboard());
        assert_eq!(flip(Square::D3, p, o), Square::D4.bitboard());
        assert_eq!(flip(Square::E6, p, o), Square::E5.bitboard());
        assert_eq!(flip(Square::F5, p, o), Square::E5.bitboard());
        assert_eq!(flip(Square::A1, p, o), 0);
        assert_eq!(flip(Square::C5, p, o), 0);
    }

    #[test]
    fn test_flip_long_diagonal() {
        let board = Board::from_string(
            "XXXXXXXOXOOXXXXOXOXXXOXOXOOXOXXOXOXOOOXOXOOOOOXOXOOOXXXO-X-OXOOO",
            Piece::Black,
        );
        let flipped = flip(Square::A8, board.player, board.opponent);
        let expected = Square::B7.bitboard()
            | Square::C6.bitboard()
            | Square::D5.bitboard()
            | Square::E4.bitboard()
            | Square::F3.bitboard();
        assert_eq!(flipped, expected);
    }

    #[test]
    fn test_flip_matches_move_generation() {
        // flip(x) != 0 exactly on the squares get_moves reports, across a
        // few plies of a real game.
        let mut board = Board::new();
        for mv in [Square::D3, Square::C5, Square::E6, Square::F5, Square::C4] {
            let moves = board.get_moves();
            for sq in BitboardIterator::new(board.get_empty()) {
                let f = flip(sq, board.player, board.opponent);
                assert_eq!(
                    f != 0,
                    bitboard::is_set(moves, sq),
                    "flip/moves disagree on {sq} for\n{board}"
                );
                // flipped discs are always opponent discs
                assert_eq!(f & !board.opponent, 0);
            }
            board = board.make_move(mv);
        }
    }

    #[test]
    fn test_flip_wipeout() {
        // Player captures every opponent disc on one row.
        let p = Square::A1.bitboard();
        let o = Square::B1.bitboard() | Square::C1.bitboard() | Square::D1.bitboard();
        assert_eq!(flip(Square::E1, p, o), o);
    }

    #[test]
    fn test_flip_no_wrap_across_edges() {
        // H-file player disc must not flip across the board edge onto the
        // next rank.
        let p = Square::H3.bitboard();
        let o = Square::A4.bitboard() | Square::B4.bitboard();
        assert_eq!(flip(Square::C4, p, o), 0);
    }

    #[test]
    fn test_scalar_agrees_with_dispatch() {
        let mut board = Board::new();
        for mv in [Square::D3, Square::C3, Square::C4, Square::C5, Square::B6] {
            for sq in BitboardIterator::new(board.get_empty()) {
                assert_eq!(
                    super::scalar::flip(sq, board.player, board.opponent),
                    flip(sq, board.player, board.opponent)
                );
            }
            board = board.make_move(mv);
        }
    }
}
