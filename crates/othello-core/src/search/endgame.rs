//! Exact endgame solver.
//!
//! The solver descends through narrowing regimes: a full PVS with tables
//! and selectivity, a null-window band with the shared table, a band backed
//! by the per-thread endgame cache, a parity-ordered shallow search without
//! any table, and hand-written kernels for the last four empties built on
//! `count_last_flip`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::bitboard;
use crate::board::Board;
use crate::constants::{SCORE_INF, SCORE_MAX, to_endgame_score, to_midgame_score};
use crate::count_last_flip::count_last_flip;
use crate::move_list::{ConcurrentMoveIterator, MoveList};
use crate::probcut::{self, NO_SELECTIVITY};
use crate::search::endgame_cache::{
    CACHE_MAX_EMPTIES, CacheBound, EndgameCache, EndgameCacheEntry,
};
use crate::search::node_type::{NodeType, NonPV, PV, Root};
use crate::search::search_context::{GamePhase, SearchContext};
use crate::search::search_result::SearchResult;
use crate::search::threading::{SplitPoint, Thread};
use crate::search::{SearchTask, enhanced_transposition_cutoff, midgame, store_result};
use crate::square::Square;
use crate::stability;
use crate::types::{Depth, Score, Scoref};

/// Region masks of the quadrant-parity bits, indexed by the parity nibble.
#[rustfmt::skip]
const QUADRANT_MASK: [u64; 16] = [
    0x0000000000000000, 0x000000000F0F0F0F, 0x00000000F0F0F0F0, 0x00000000FFFFFFFF,
    0x0F0F0F0F00000000, 0x0F0F0F0F0F0F0F0F, 0x0F0F0F0FF0F0F0F0, 0x0F0F0F0FFFFFFFFF,
    0xF0F0F0F000000000, 0xF0F0F0F00F0F0F0F, 0xF0F0F0F0F0F0F0F0, 0xF0F0F0F0FFFFFFFF,
    0xFFFFFFFF00000000, 0xFFFFFFFF0F0F0F0F, 0xFFFFFFFFF0F0F0F0, 0xFFFFFFFFFFFFFFFF,
];

/// Below this many empties the search drops every table.
const DEPTH_TO_SHALLOW_SEARCH: Depth = 7;

/// Minimum empties before offering an endgame node to the worker pool.
pub const MIN_SPLIT_DEPTH: Depth = 7;

/// Minimum empties for the enhanced transposition cutoff.
const MIN_ETC_DEPTH: Depth = 6;

/// Empties at which the PVS regime hands over to the null-window solver.
pub const DEPTH_MIDGAME_TO_ENDGAME: Depth = 13;

/// PV nodes within this height of the root also go to the PV table.
const PV_HASH_HEIGHT: usize = 4;

thread_local! {
    static ENDGAME_CACHE: RefCell<EndgameCache> = RefCell::new(EndgameCache::new(16));
}

/// Endgame root: iterates selectivity stages up to the exact solve, each
/// inside a small aspiration window around the previous stage's score.
pub fn search_root(task: SearchTask, thread: &Arc<Thread>) -> SearchResult {
    let board = task.board;
    let level = task.level;
    let mut ctx = SearchContext::new(
        &board,
        task.selectivity,
        task.tt.clone(),
        task.pv_table.clone(),
        task.eval.clone(),
        thread.abort_handle(),
    );
    if let Some(ref callback) = task.callback {
        ctx.set_callback(callback.clone());
    }

    let n_empties = ctx.empty_list.count;
    let base = estimate_aspiration_base_score(&mut ctx, &board, n_empties, thread);

    ctx.game_phase = GamePhase::EndGame;
    let mut best_score = base;
    let mut alpha = (base - 3).max(-SCORE_INF);
    let mut beta = (base + 3).min(SCORE_INF);

    for selectivity in 1..=NO_SELECTIVITY {
        if level.get_end_depth(selectivity) < n_empties {
            break;
        }
        ctx.selectivity = selectivity;
        let mut delta = 2;

        loop {
            best_score = search::<Root>(&mut ctx, &board, alpha, beta, thread);

            if thread.is_search_aborted() {
                break;
            }

            if best_score <= alpha {
                beta = alpha;
                alpha = (best_score - delta).max(-SCORE_INF);
            } else if best_score >= beta {
                alpha = (beta - delta).max(alpha);
                beta = (best_score + delta).min(SCORE_INF);
            } else {
                break;
            }

            delta += delta;
        }

        if thread.is_search_aborted() {
            break;
        }

        alpha = (best_score - 2).max(-SCORE_INF);
        beta = (best_score + 2).min(SCORE_INF);

        if let Some(rm) = ctx.get_best_root_move(false) {
            ctx.notify_progress(
                n_empties,
                best_score as Scoref,
                rm.sq,
                ctx.selectivity,
                rm.pv.to_vec(),
                true,
            );
        }
    }

    match ctx.get_best_root_move(false) {
        Some(rm) if rm.score != -SCORE_INF => SearchResult {
            score: rm.score as Scoref,
            best_move: Some(rm.sq),
            n_nodes: ctx.n_nodes,
            pv_line: rm.pv.to_vec(),
            depth: n_empties,
            selectivity: ctx.selectivity,
            is_endgame: true,
            time_ms: 0,
        },
        // aborted before any stage completed
        _ => midgame::fallback_result(&mut ctx, &board),
    }
}

/// Centers the first aspiration window with a midgame estimate: a deep
/// exact table hit, a half-depth search, or a static evaluation.
fn estimate_aspiration_base_score(
    ctx: &mut SearchContext,
    board: &Board,
    n_empties: u32,
    thread: &Arc<Thread>,
) -> Score {
    ctx.game_phase = GamePhase::MidGame;
    let midgame_depth = n_empties / 2;

    let tt_hit = ctx.tt.probe(board.hash());
    let score = if let Some(data) = tt_hit
        && data.lower == data.upper
        && data.depth >= midgame_depth
    {
        data.lower
    } else if n_empties >= 22 {
        midgame::search::<PV>(ctx, board, midgame_depth, -SCORE_INF, SCORE_INF, thread)
    } else if n_empties >= 12 {
        midgame::evaluate_depth2(ctx, board, -SCORE_INF, SCORE_INF)
    } else {
        midgame::evaluate(ctx, board)
    };

    to_endgame_score(score)
}

/// Endgame PVS in disc-difference units; exact within its window at
/// `NO_SELECTIVITY`.
pub fn search<NT: NodeType>(
    ctx: &mut SearchContext,
    board: &Board,
    mut alpha: Score,
    beta: Score,
    thread: &Arc<Thread>,
) -> Score {
    let org_alpha = alpha;
    let n_empties = ctx.empty_list.count;

    if NT::PV_NODE {
        if n_empties == 0 {
            return final_score(board);
        }
    } else {
        if n_empties <= DEPTH_MIDGAME_TO_ENDGAME {
            return null_window_search(ctx, board, alpha);
        }

        if let Some(score) = stability::stability_cutoff(board, n_empties, alpha) {
            return score;
        }
    }

    let nodes_at_entry = ctx.n_nodes;
    let tt_key = board.hash();
    ctx.tt.prefetch(tt_key);

    let mut move_list = MoveList::new(board);
    if move_list.count() == 0 {
        let next = board.switch_players();
        if next.has_legal_moves() {
            ctx.update_pass();
            let score = -search::<NT>(ctx, &next, -beta, -alpha, thread);
            ctx.undo_pass();
            return score;
        }
        return solve(board, n_empties);
    } else if let Some(sq) = move_list.wipeout_move {
        if NT::ROOT_NODE {
            ctx.update_root_move(sq, SCORE_MAX, 1, alpha);
        } else if NT::PV_NODE {
            ctx.update_pv(sq);
        }
        return SCORE_MAX;
    }

    let tt_data = ctx.tt.probe(tt_key);
    let tt_move = tt_data.map_or(Square::None, |d| d.move1);
    let tt_move2 = tt_data.map_or(Square::None, |d| d.move2);

    if !NT::PV_NODE {
        if let Some(data) = tt_data
            && data.covers(n_empties, ctx.selectivity)
        {
            let lower = to_endgame_score(data.lower.max(-SCORE_INF));
            let upper = to_endgame_score(data.upper.min(SCORE_INF));
            if lower >= beta {
                return lower;
            }
            if upper <= alpha {
                return upper;
            }
            if lower == upper {
                return lower;
            }
        }

        if n_empties >= MIN_ETC_DEPTH
            && let Some(score) = enhanced_transposition_cutoff(
                ctx,
                board,
                &move_list,
                n_empties,
                to_midgame_score(alpha),
                to_midgame_score(beta),
                tt_key,
            )
        {
            return to_endgame_score(score);
        }

        if let Some(score) = probcut::probcut_endgame(ctx, board, n_empties, alpha, beta, thread) {
            return score;
        }
    }

    if move_list.count() > 1 {
        move_list.evaluate_moves::<NT>(ctx, board, n_empties, (tt_move, tt_move2));
        move_list.sort();
    }

    let move_iter = Arc::new(ConcurrentMoveIterator::new(move_list));
    let mut best_move = Square::None;
    let mut best_score = -SCORE_INF;

    while let Some((mv, move_count)) = move_iter.next() {
        let next = board.make_move_with_flipped(mv.flipped, mv.sq);
        ctx.update(mv);

        let mut score = -SCORE_INF;
        if !NT::PV_NODE || move_count > 1 {
            score = -search::<NonPV>(ctx, &next, -(alpha + 1), -alpha, thread);
        }

        if NT::PV_NODE && (move_count == 1 || score > alpha) {
            ctx.clear_pv();
            score = -search::<PV>(ctx, &next, -beta, -alpha, thread);
        }

        ctx.undo(mv);

        if thread.is_search_aborted() || thread.cutoff_occurred() {
            return 0;
        }

        if NT::ROOT_NODE {
            ctx.update_root_move(mv.sq, score, move_count, alpha);
        }

        if score > best_score {
            best_score = score;

            if score > alpha {
                best_move = mv.sq;

                if NT::PV_NODE && !NT::ROOT_NODE {
                    ctx.update_pv(mv.sq);
                }

                if NT::PV_NODE && score < beta {
                    alpha = score;
                } else {
                    break;
                }
            }
        }

        if n_empties >= MIN_SPLIT_DEPTH && move_iter.remaining() >= 2 && thread.can_split() {
            // the split point carries the window in scaled units
            let (s, m, n) = thread.split(
                ctx,
                board,
                to_midgame_score(alpha),
                to_midgame_score(beta),
                to_midgame_score(best_score),
                best_move,
                n_empties,
                &move_iter,
                NT::TYPE_ID,
            );
            best_score = to_endgame_score(s);
            best_move = m;
            ctx.n_nodes += n;

            if thread.is_search_aborted() || thread.cutoff_occurred() {
                return 0;
            }

            if best_score >= beta {
                break;
            }
        }
    }

    store_result::<NT>(
        ctx,
        tt_key,
        nodes_at_entry,
        n_empties,
        to_midgame_score(org_alpha),
        to_midgame_score(beta),
        to_midgame_score(best_score),
        best_move,
        PV_HASH_HEIGHT,
    );

    best_score
}

/// Split-point continuation of [`search`]. The split point carries the
/// window in scaled units shared with the midgame; endgame values convert
/// at the boundary.
pub fn search_sp<NT: NodeType>(
    ctx: &mut SearchContext,
    board: &Board,
    thread: &Arc<Thread>,
    split_point: &Arc<SplitPoint>,
) -> Score {
    let beta = to_endgame_score(split_point.state().beta);
    let move_iter = split_point.state().move_iter.clone().unwrap();

    while let Some((mv, move_count)) = move_iter.next() {
        split_point.unlock();

        let next = board.make_move_with_flipped(mv.flipped, mv.sq);
        ctx.update(mv);

        let alpha = to_endgame_score(split_point.state().alpha());
        let mut score = -SCORE_INF;
        if !NT::PV_NODE || move_count > 1 {
            score = -search::<NonPV>(ctx, &next, -(alpha + 1), -alpha, thread);
        }

        if NT::PV_NODE && score > alpha {
            ctx.clear_pv();
            let alpha = to_endgame_score(split_point.state().alpha());
            score = -search::<PV>(ctx, &next, -beta, -alpha, thread);
        }

        ctx.undo(mv);

        split_point.lock();

        if thread.is_search_aborted() || thread.cutoff_occurred() {
            return 0;
        }

        let sp = split_point.state();
        let sp_best = to_endgame_score(sp.best_score());

        if NT::ROOT_NODE {
            ctx.update_root_move(mv.sq, score, move_count, to_endgame_score(sp.alpha()));
        }

        if score > sp_best {
            sp.set_best_score(to_midgame_score(score));

            if score > to_endgame_score(sp.alpha()) {
                sp.set_best_move(mv.sq);

                if NT::PV_NODE && !NT::ROOT_NODE {
                    ctx.update_pv(mv.sq);
                    split_point.state_mut().copy_pv(ctx.get_pv());
                }

                if NT::PV_NODE && score < beta {
                    sp.set_alpha(to_midgame_score(score));
                } else {
                    sp.set_cutoff(true);
                    break;
                }
            }
        }
    }

    to_endgame_score(split_point.state().best_score())
}

/// Null-window solver backed by the shared table.
pub fn null_window_search(ctx: &mut SearchContext, board: &Board, alpha: Score) -> Score {
    let n_empties = ctx.empty_list.count;
    let beta = alpha + 1;

    // cooperative stop; the unwinding caller discards the score
    if ctx.is_stopped() {
        return alpha;
    }

    let tt_key = board.hash();
    ctx.tt.prefetch(tt_key);

    if let Some(score) = stability::stability_cutoff(board, n_empties, alpha) {
        return score;
    }

    let mut move_list = MoveList::new(board);
    if move_list.wipeout_move.is_some() {
        return SCORE_MAX;
    } else if move_list.count() == 0 {
        let next = board.switch_players();
        if next.has_legal_moves() {
            return -null_window_search(ctx, &next, -beta);
        }
        return solve(board, n_empties);
    }

    let nodes_at_entry = ctx.n_nodes;
    let tt_data = ctx.tt.probe(tt_key);
    let tt_move = tt_data.map_or(Square::None, |d| d.move1);

    if let Some(data) = tt_data
        && data.covers(n_empties, NO_SELECTIVITY)
    {
        let lower = to_endgame_score(data.lower.max(-SCORE_INF));
        let upper = to_endgame_score(data.upper.min(SCORE_INF));
        if lower >= beta {
            return lower;
        }
        if upper <= alpha {
            return upper;
        }
    }

    let mut best_score = -SCORE_INF;
    let mut best_move = Square::None;
    if move_list.count() >= 2 {
        move_list.evaluate_moves_fast(board, tt_move, ctx.empty_list.parity);
        for mv in move_list.best_first_iter() {
            let next = board.make_move_with_flipped(mv.flipped, mv.sq);

            ctx.update_endgame(mv.sq);
            let score = if ctx.empty_list.count <= CACHE_MAX_EMPTIES {
                -null_window_search_with_cache(ctx, &next, -beta)
            } else {
                -null_window_search(ctx, &next, -beta)
            };
            ctx.undo_endgame(mv.sq);

            if score > best_score {
                best_move = mv.sq;
                best_score = score;
                if score >= beta {
                    break;
                }
            }
        }
    } else {
        let mv = move_list.first().unwrap();
        let next = board.make_move_with_flipped(mv.flipped, mv.sq);
        ctx.update_endgame(mv.sq);
        best_score = if ctx.empty_list.count <= CACHE_MAX_EMPTIES {
            -null_window_search_with_cache(ctx, &next, -beta)
        } else {
            -null_window_search(ctx, &next, -beta)
        };
        ctx.undo_endgame(mv.sq);
        best_move = mv.sq;
    }

    // a stopped search unwound with partial results; never store them
    if ctx.is_stopped() {
        return best_score;
    }

    let cost = ((ctx.n_nodes - nodes_at_entry) | 1).ilog2();
    ctx.tt.store(
        tt_key,
        cost,
        n_empties,
        NO_SELECTIVITY,
        to_midgame_score(alpha),
        to_midgame_score(beta),
        to_midgame_score(best_score),
        best_move,
    );

    best_score
}

#[inline(always)]
fn probe_endgame_cache(key: u64, n_empties: Depth) -> Option<EndgameCacheEntry> {
    ENDGAME_CACHE.with(|cell| cell.borrow().probe(key, n_empties))
}

#[inline(always)]
fn store_endgame_cache(
    key: u64,
    n_empties: Depth,
    alpha: Score,
    beta: Score,
    score: Score,
    best_move: Square,
) {
    let bound = CacheBound::classify(score, alpha, beta);
    ENDGAME_CACHE.with(|cell| {
        cell.borrow_mut()
            .store(key, n_empties, score, bound, best_move)
    });
}

/// Null-window solver backed by the per-thread endgame cache instead of the
/// shared table.
fn null_window_search_with_cache(ctx: &mut SearchContext, board: &Board, alpha: Score) -> Score {
    let n_empties = ctx.empty_list.count;
    let beta = alpha + 1;

    if ctx.is_stopped() {
        return alpha;
    }

    let key = board.hash();
    let mut tt_move = Square::None;
    if let Some(entry) = probe_endgame_cache(key, n_empties) {
        if entry.should_cut(beta) {
            return entry.score;
        }
        tt_move = entry.best_move;
    }

    if let Some(score) = stability::stability_cutoff(board, n_empties, alpha) {
        return score;
    }

    let mut move_list = MoveList::new(board);
    if move_list.wipeout_move.is_some() {
        return SCORE_MAX;
    } else if move_list.count() == 0 {
        let next = board.switch_players();
        if next.has_legal_moves() {
            return -null_window_search_with_cache(ctx, &next, -beta);
        }
        return solve(board, n_empties);
    }

    let mut best_score = -SCORE_INF;
    let mut best_move = Square::None;
    if move_list.count() >= 2 {
        move_list.evaluate_moves_fast(board, tt_move, ctx.empty_list.parity);
        for mv in move_list.best_first_iter() {
            let next = board.make_move_with_flipped(mv.flipped, mv.sq);
            ctx.update_endgame(mv.sq);
            let score = if ctx.empty_list.count <= DEPTH_TO_SHALLOW_SEARCH {
                -shallow_search(ctx, &next, -beta)
            } else {
                -null_window_search_with_cache(ctx, &next, -beta)
            };
            ctx.undo_endgame(mv.sq);

            if score > best_score {
                best_move = mv.sq;
                best_score = score;
                if score >= beta {
                    break;
                }
            }
        }
    } else {
        let mv = move_list.first().unwrap();
        let next = board.make_move_with_flipped(mv.flipped, mv.sq);
        ctx.update_endgame(mv.sq);
        best_score = if ctx.empty_list.count <= DEPTH_TO_SHALLOW_SEARCH {
            -shallow_search(ctx, &next, -beta)
        } else {
            -null_window_search_with_cache(ctx, &next, -beta)
        };
        ctx.undo_endgame(mv.sq);
        best_move = mv.sq;
    }

    store_endgame_cache(key, n_empties, alpha, beta, best_score, best_move);

    best_score
}

/// Shallow solver: no tables beyond the endgame cache, moves tried in
/// parity-interleaved empty-list order.
pub fn shallow_search(ctx: &mut SearchContext, board: &Board, alpha: Score) -> Score {
    let n_empties = ctx.empty_list.count;
    let beta = alpha + 1;

    fn search_child(ctx: &mut SearchContext, next: &Board, beta: Score) -> Score {
        if ctx.empty_list.count == 4 {
            if let Some(score) = stability::stability_cutoff(next, 4, -beta) {
                -score
            } else {
                let (sq1, sq2, sq3, sq4) = sort_empties_at_4(ctx);
                -solve4(ctx, next, -beta, sq1, sq2, sq3, sq4)
            }
        } else {
            -shallow_search(ctx, next, -beta)
        }
    }

    let key = board.hash();
    let mut tt_move = Square::None;
    if let Some(entry) = probe_endgame_cache(key, n_empties) {
        if entry.should_cut(beta) {
            return entry.score;
        }
        tt_move = entry.best_move;
    }

    let mut best_move = Square::None;
    let mut best_score = -SCORE_INF;
    if tt_move != Square::None
        && let Some(next) = board.try_make_move(tt_move)
    {
        ctx.update_endgame(tt_move);
        let score = search_child(ctx, &next, beta);
        ctx.undo_endgame(tt_move);

        if score >= beta {
            store_endgame_cache(key, n_empties, alpha, beta, score, tt_move);
            return score;
        }
        best_move = tt_move;
        best_score = score;
    }

    let mut moves = board.get_moves();
    if moves == 0 {
        let next = board.switch_players();
        if next.has_legal_moves() {
            return -shallow_search(ctx, &next, -beta);
        }
        return solve(board, n_empties);
    } else if best_move != Square::None {
        moves &= !best_move.bitboard();
        if moves == 0 {
            store_endgame_cache(key, n_empties, alpha, beta, best_score, best_move);
            return best_score;
        }
    }

    if let Some(score) = stability::stability_cutoff(board, n_empties, alpha) {
        return score;
    }

    // odd-quadrant moves first, the rest afterwards
    let mut priority_moves = moves & QUADRANT_MASK[ctx.empty_list.parity as usize];
    if priority_moves == 0 {
        priority_moves = moves;
    }

    loop {
        moves ^= priority_moves;
        let mut sq = ctx.empty_list.first();
        loop {
            while !bitboard::is_set(priority_moves, sq) {
                sq = ctx.empty_list.next(sq);
            }

            priority_moves &= !sq.bitboard();
            let next = board.make_move(sq);

            ctx.update_endgame(sq);
            let score = search_child(ctx, &next, beta);
            ctx.undo_endgame(sq);

            if score > best_score {
                if score >= beta {
                    store_endgame_cache(key, n_empties, alpha, beta, score, sq);
                    return score;
                }
                best_move = sq;
                best_score = score;
            }

            if priority_moves == 0 {
                break;
            }
        }

        priority_moves = moves;
        if priority_moves == 0 {
            break;
        }
    }

    store_endgame_cache(key, n_empties, alpha, beta, best_score, best_move);

    best_score
}

/// Orders the last four empties so squares in odd quadrants come first.
#[inline(always)]
fn sort_empties_at_4(ctx: &SearchContext) -> (Square, Square, Square, Square) {
    let (sq1, quad1) = ctx.empty_list.first_with_quadrant();
    let (sq2, quad2) = ctx.empty_list.next_with_quadrant(sq1);
    let (sq3, quad3) = ctx.empty_list.next_with_quadrant(sq2);
    let sq4 = ctx.empty_list.next(sq3);
    let parity = ctx.empty_list.parity;

    if parity & quad1 == 0 {
        if parity & quad2 != 0 {
            if parity & quad3 != 0 {
                (sq2, sq3, sq1, sq4)
            } else {
                (sq2, sq4, sq1, sq3)
            }
        } else if parity & quad3 != 0 {
            (sq3, sq4, sq1, sq2)
        } else {
            (sq1, sq2, sq3, sq4)
        }
    } else if parity & quad2 == 0 {
        if parity & quad3 != 0 {
            (sq1, sq3, sq2, sq4)
        } else {
            (sq1, sq4, sq2, sq3)
        }
    } else {
        (sq1, sq2, sq3, sq4)
    }
}

/// Exact solver for four empties.
fn solve4(
    ctx: &mut SearchContext,
    board: &Board,
    alpha: Score,
    sq1: Square,
    sq2: Square,
    sq3: Square,
    sq4: Square,
) -> Score {
    let beta = alpha + 1;
    let mut best_score = -SCORE_INF;

    if let Some(next) = board.try_make_move(sq1) {
        best_score = -solve3(ctx, &next, -beta, sq2, sq3, sq4);
        if best_score > alpha {
            return best_score;
        }
    }

    if let Some(next) = board.try_make_move(sq2) {
        let score = -solve3(ctx, &next, -beta, sq1, sq3, sq4);
        if score > alpha {
            return score;
        }
        best_score = score.max(best_score);
    }

    if let Some(next) = board.try_make_move(sq3) {
        let score = -solve3(ctx, &next, -beta, sq1, sq2, sq4);
        if score > alpha {
            return score;
        }
        best_score = score.max(best_score);
    }

    if let Some(next) = board.try_make_move(sq4) {
        let score = -solve3(ctx, &next, -beta, sq1, sq2, sq3);
        return score.max(best_score);
    }

    if best_score == -SCORE_INF {
        let pass = board.switch_players();
        if pass.has_legal_moves() {
            best_score = -solve4(ctx, &pass, -beta, sq1, sq2, sq3, sq4);
        } else {
            best_score = solve(board, 4);
        }
    }

    best_score
}

/// Exact solver for three empties.
fn solve3(
    ctx: &mut SearchContext,
    board: &Board,
    alpha: Score,
    sq1: Square,
    sq2: Square,
    sq3: Square,
) -> Score {
    ctx.increment_nodes();
    let beta = alpha + 1;
    let mut best_score = -SCORE_INF;

    if let Some(next) = board.try_make_move(sq1) {
        best_score = -solve2(ctx, &next, -beta, sq2, sq3);
        if best_score > alpha {
            return best_score;
        }
    }

    if let Some(next) = board.try_make_move(sq2) {
        let score = -solve2(ctx, &next, -beta, sq1, sq3);
        if score > alpha {
            return score;
        }
        best_score = score.max(best_score);
    }

    if let Some(next) = board.try_make_move(sq3) {
        let score = -solve2(ctx, &next, -beta, sq1, sq2);
        return score.max(best_score);
    }

    if best_score != -SCORE_INF {
        return best_score;
    }

    // the mover passes; minimize from the opponent's replies
    ctx.increment_nodes();
    best_score = SCORE_INF;
    let pass = board.switch_players();

    if let Some(next) = pass.try_make_move(sq1) {
        best_score = solve2(ctx, &next, alpha, sq2, sq3);
        if best_score <= alpha {
            return best_score;
        }
    }

    if let Some(next) = pass.try_make_move(sq2) {
        let score = solve2(ctx, &next, alpha, sq1, sq3);
        if score <= alpha {
            return score;
        }
        best_score = score.min(best_score);
    }

    if let Some(next) = pass.try_make_move(sq3) {
        let score = solve2(ctx, &next, alpha, sq1, sq2);
        return score.min(best_score);
    }

    if best_score != SCORE_INF {
        return best_score;
    }

    solve(board, 3)
}

/// Exact solver for two empties.
#[inline(always)]
fn solve2(ctx: &mut SearchContext, board: &Board, alpha: Score, sq1: Square, sq2: Square) -> Score {
    ctx.increment_nodes();
    let beta = alpha + 1;

    if let Some(next) = board.try_make_move(sq1) {
        let best_score = -solve1(ctx, &next, -beta, sq2);
        if best_score > alpha {
            return best_score;
        }
        if let Some(next) = board.try_make_move(sq2) {
            let score = -solve1(ctx, &next, -beta, sq1);
            return score.max(best_score);
        }
        return best_score;
    } else if let Some(next) = board.try_make_move(sq2) {
        return -solve1(ctx, &next, -beta, sq1);
    }

    ctx.increment_nodes();
    let pass = board.switch_players();
    if let Some(next) = pass.try_make_move(sq1) {
        let best_score = solve1(ctx, &next, alpha, sq2);
        if best_score <= alpha {
            return best_score;
        }
        if let Some(next) = pass.try_make_move(sq2) {
            let score = solve1(ctx, &next, alpha, sq1);
            return score.min(best_score);
        }
        return best_score;
    } else if let Some(next) = pass.try_make_move(sq2) {
        return solve1(ctx, &next, alpha, sq1);
    }

    solve(board, 2)
}

/// Exact score with one empty left: `count_last_flip` for the mover, then
/// for the opponent if the mover must pass.
#[inline(always)]
fn solve1(ctx: &mut SearchContext, board: &Board, alpha: Score, sq: Square) -> Score {
    ctx.increment_nodes();
    let mut score = board.get_player_count() as Score * 2 - 64 + 2;
    let mut n_flipped = count_last_flip(board.player, sq);
    score += n_flipped;

    if n_flipped == 0 {
        // the mover passes; the final empty goes to whoever can use it
        let score_passed = score - 2;
        if score <= 0 {
            score = score_passed;
        }

        if score > alpha {
            n_flipped = count_last_flip(board.opponent, sq);
            if n_flipped != 0 {
                score = score_passed - n_flipped;
            }
        }
    }

    score
}

/// Exact final score when both players are stuck: the leader collects the
/// remaining empties.
#[inline(always)]
pub fn solve(board: &Board, n_empties: u32) -> Score {
    let score = board.get_player_count() as Score * 2 - 64;
    let diff = score + n_empties as Score;

    match diff.cmp(&0) {
        Ordering::Equal => diff,
        Ordering::Greater => diff + n_empties as Score,
        Ordering::Less => score,
    }
}

/// Final disc difference of a full board.
#[inline(always)]
pub fn final_score(board: &Board) -> Score {
    board.get_player_count() as Score * 2 - 64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Piece;

    #[test]
    fn test_solve_rewards_leader_with_empties() {
        // player 20 discs, opponent 10, 34 empties, both stuck
        let player = (1u64 << 20) - 1;
        let opponent = ((1u64 << 30) - 1) ^ player;
        let board = Board::from_bitboards(player, opponent);
        assert_eq!(solve(&board, 34), (20 * 2 - 64) + 34 + 34);
    }

    #[test]
    fn test_solve_tied_splits_empties() {
        let player = (1u64 << 15) - 1;
        let opponent = ((1u64 << 30) - 1) ^ player;
        let board = Board::from_bitboards(player, opponent);
        // 15 vs 15 discs with 34 empties: diff = -34 + 34 = 0
        assert_eq!(solve(&board, 34), 0);
    }

    #[test]
    fn test_final_score_counts_discs() {
        let board = Board::from_string(
            "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOO",
            Piece::Black,
        );
        assert_eq!(final_score(&board), 0);
    }

    #[test]
    fn test_solve1_counts_double_flip() {
        // One empty at H8. Playing there flips H7, H6 (bounded by the
        // player disc on H5) and G8, F8 (bounded by E8): four discs.
        let board = Board::from_string(
            "OOOOOOOO\
             OOOOOOOO\
             OOOOOOOO\
             OOOOOOOO\
             OOOOOOOX\
             OOOOOOOO\
             OOOOOOOO\
             OOOOXOO-",
            Piece::Black,
        );
        let tt = Arc::new(crate::transposition_table::TranspositionTable::new(1));
        let pv = Arc::new(crate::transposition_table::TranspositionTable::new(1));
        let eval = Arc::new(crate::eval::Eval::with_weight_file(None).unwrap());
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut ctx = SearchContext::new(&board, NO_SELECTIVITY, tt, pv, eval, stop);

        let n_flipped = count_last_flip(board.player, Square::H8);
        assert_eq!(n_flipped, 2 * 4);

        let score = solve1(&mut ctx, &board, -SCORE_INF, Square::H8);
        let expected = (board.get_player_count() as Score) * 2 - 64 + 2 + n_flipped;
        assert_eq!(score, expected);
    }
}
