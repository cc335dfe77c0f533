use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use othello_core::bitboard;
use othello_core::board::Board;
use othello_core::square::Square;

fn bench_get_moves(c: &mut Criterion) {
    let positions: Vec<Board> = {
        let mut boards = vec![Board::new()];
        let mut board = Board::new();
        for mv in [Square::D3, Square::C5, Square::E6, Square::F5, Square::C4] {
            board = board.make_move(mv);
            boards.push(board);
        }
        boards
    };

    c.bench_function("get_moves", |b| {
        b.iter(|| {
            let mut acc = 0u64;
            for board in &positions {
                acc ^= bitboard::get_moves(black_box(board.player), black_box(board.opponent));
            }
            acc
        })
    });
}

fn bench_make_move(c: &mut Criterion) {
    let board = Board::new().make_move(Square::D3).make_move(Square::C5);

    c.bench_function("make_move", |b| {
        b.iter(|| {
            let mut acc = 0u64;
            for sq in bitboard::BitboardIterator::new(board.get_moves()) {
                let next = black_box(&board).make_move(sq);
                acc ^= next.player;
            }
            acc
        })
    });
}

criterion_group!(benches, bench_get_moves, bench_make_move);
criterion_main!(benches);
