//! Midgame principal-variation search with iterative deepening and
//! aspiration windows at the root.

use std::sync::Arc;

use rand::seq::IteratorRandom;

use crate::bitboard::BitboardIterator;
use crate::board::Board;
use crate::constants::{EVAL_SCORE_SCALE, EVAL_SCORE_SCALE_BITS, MID_SCORE_MAX, SCORE_INF};
use crate::flip;
use crate::move_list::{ConcurrentMoveIterator, MoveList};
use crate::probcut;
use crate::search::node_type::{NodeType, NonPV, PV, Root};
use crate::search::search_context::{GamePhase, SearchContext};
use crate::search::search_result::SearchResult;
use crate::search::threading::{SplitPoint, Thread};
use crate::search::time_control::should_stop_iteration;
use crate::search::{SearchTask, endgame, enhanced_transposition_cutoff, store_result};
use crate::square::Square;
use crate::stability;
use crate::types::{Depth, Score, Selectivity};

/// Minimum depth before offering a node to the worker pool.
pub const MIN_SPLIT_DEPTH: Depth = 5;

/// Minimum depth for the enhanced transposition cutoff.
const MIN_ETC_DEPTH: Depth = 6;

/// Minimum depth for internal iterative deepening.
const IID_MIN_DEPTH: Depth = 8;

/// PV nodes within this height of the root also record their result in the
/// PV table.
const PV_HASH_HEIGHT: usize = 4;

/// Initial aspiration half-window, three discs.
const ASPIRATION_DELTA: Score = 3 * EVAL_SCORE_SCALE;

/// Iterative-deepening driver for midgame positions.
pub fn search_root(task: SearchTask, thread: &Arc<Thread>) -> SearchResult {
    let board = task.board;
    let time_manager = task.time_manager.clone();

    let mut ctx = SearchContext::new(
        &board,
        task.selectivity,
        task.tt.clone(),
        task.pv_table.clone(),
        task.eval.clone(),
        thread.abort_handle(),
    );
    ctx.game_phase = GamePhase::MidGame;
    if let Some(ref callback) = task.callback {
        ctx.set_callback(callback.clone());
    }

    let n_empties = ctx.empty_list.count;

    // The opening position is symmetric; all four moves are book-equal.
    if n_empties == 60 {
        return SearchResult {
            score: 0.0,
            best_move: Some(random_move(&board)),
            n_nodes: 0,
            pv_line: Vec::new(),
            depth: 0,
            selectivity: ctx.selectivity,
            is_endgame: false,
            time_ms: 0,
        };
    }

    let org_selectivity = ctx.selectivity;
    let max_depth = task.level.mid_depth.max(1).min(n_empties);
    let mut depth = start_depth(max_depth);

    while depth <= max_depth {
        // Early iterations run more selectively; the final one at the
        // configured selectivity.
        ctx.selectivity = org_selectivity.saturating_sub((max_depth - depth) as Selectivity);
        ctx.save_previous_scores();

        let (mut alpha, mut beta) = aspiration_window(&ctx, depth);
        let score = aspiration_search(&mut ctx, &board, depth, &mut alpha, &mut beta, thread);

        if thread.is_search_aborted() {
            break;
        }

        if let Some(rm) = ctx.get_best_root_move(false) {
            ctx.notify_progress(
                depth,
                scaled_to_f32(score),
                rm.sq,
                ctx.selectivity,
                rm.pv.to_vec(),
                false,
            );
        }

        if should_stop_iteration(&time_manager) {
            break;
        }

        depth = if depth <= 10 { depth + 2 } else { depth + 1 };
    }

    let best = ctx.get_best_root_move(false);
    let reached = depth.min(max_depth);
    match best {
        Some(rm) if rm.score != -SCORE_INF => SearchResult {
            score: scaled_to_f32(rm.score),
            best_move: Some(rm.sq),
            n_nodes: ctx.n_nodes,
            pv_line: rm.pv.to_vec(),
            depth: reached,
            selectivity: ctx.selectivity,
            is_endgame: false,
            time_ms: 0,
        },
        _ => fallback_result(&mut ctx, &board),
    }
}

/// Depth-1 fallback when the search was aborted before any iteration
/// completed: still returns a legal, plausibly best move.
pub(crate) fn fallback_result(ctx: &mut SearchContext, board: &Board) -> SearchResult {
    let mut best_move = None;
    let mut best_score = -SCORE_INF;
    for sq in BitboardIterator::new(board.get_moves()) {
        let flipped = flip::flip(sq, board.player, board.opponent);
        let next = board.make_move_with_flipped(flipped, sq);
        let mv = crate::move_list::Move::new(sq, flipped);
        ctx.update(&mv);
        let score = -evaluate(ctx, &next);
        ctx.undo(&mv);
        if score > best_score {
            best_score = score;
            best_move = Some(sq);
        }
    }
    SearchResult {
        score: scaled_to_f32(best_score),
        best_move,
        n_nodes: ctx.n_nodes,
        pv_line: best_move.into_iter().collect(),
        depth: 1,
        selectivity: ctx.selectivity,
        is_endgame: false,
        time_ms: 0,
    }
}

fn start_depth(max_depth: Depth) -> Depth {
    let start = if max_depth % 2 == 0 { 2 } else { 1 };
    start.min(max_depth)
}

fn aspiration_window(ctx: &SearchContext, depth: Depth) -> (Score, Score) {
    if depth >= 5 {
        if let Some(rm) = ctx.get_best_root_move(false) {
            if rm.previous_score != -SCORE_INF {
                return (
                    (rm.previous_score - ASPIRATION_DELTA).max(-SCORE_INF),
                    (rm.previous_score + ASPIRATION_DELTA).min(SCORE_INF),
                );
            }
        }
    }
    (-SCORE_INF, SCORE_INF)
}

/// Repeats the root search, widening the window toward the failing side
/// until the score falls inside.
fn aspiration_search(
    ctx: &mut SearchContext,
    board: &Board,
    depth: Depth,
    alpha: &mut Score,
    beta: &mut Score,
    thread: &Arc<Thread>,
) -> Score {
    let mut delta = ASPIRATION_DELTA;

    loop {
        let score = search::<Root>(ctx, board, depth, *alpha, *beta, thread);

        if thread.is_search_aborted() {
            return score;
        }

        if score <= *alpha {
            *beta = *alpha;
            *alpha = (score - delta).max(-SCORE_INF);
        } else if score >= *beta {
            *alpha = (*beta - delta).max(*alpha);
            *beta = (score + delta).min(SCORE_INF);
        } else {
            return score;
        }

        delta += delta / 2;
    }
}

fn random_move(board: &Board) -> Square {
    let mut rng = rand::rng();
    BitboardIterator::new(board.get_moves())
        .choose(&mut rng)
        .expect("opening position has moves")
}

#[inline]
fn scaled_to_f32(score: Score) -> f32 {
    score as f32 / EVAL_SCORE_SCALE as f32
}

/// Midgame alpha-beta in scaled-score units.
pub fn search<NT: NodeType>(
    ctx: &mut SearchContext,
    board: &Board,
    depth: Depth,
    mut alpha: Score,
    beta: Score,
    thread: &Arc<Thread>,
) -> Score {
    let org_alpha = alpha;
    let n_empties = ctx.empty_list.count;

    if NT::PV_NODE {
        if depth == 0 {
            return evaluate(ctx, board);
        }
    } else {
        match depth {
            0 => return evaluate(ctx, board),
            1 => return evaluate_depth1(ctx, board, alpha, beta),
            2 => return evaluate_depth2(ctx, board, alpha, beta),
            _ => {}
        }

        if let Some(score) = stability_cutoff(board, n_empties, alpha) {
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
            let score = -search::<NT>(ctx, &next, depth, -beta, -alpha, thread);
            ctx.undo_pass();
            return score;
        }
        return solve(board, n_empties);
    } else if let Some(sq) = move_list.wipeout_move {
        if NT::ROOT_NODE {
            ctx.update_root_move(sq, MID_SCORE_MAX, 1, alpha);
        } else if NT::PV_NODE {
            ctx.update_pv(sq);
        }
        return MID_SCORE_MAX;
    }

    let tt_data = ctx.tt.probe(tt_key);
    let mut tt_move = tt_data.map_or(Square::None, |d| d.move1);
    let tt_move2 = tt_data.map_or(Square::None, |d| d.move2);

    if !NT::PV_NODE {
        if let Some(data) = tt_data
            && data.covers(depth, ctx.selectivity)
        {
            if data.lower >= beta {
                return data.lower;
            }
            if data.upper <= alpha {
                return data.upper;
            }
            if data.lower == data.upper {
                return data.lower;
            }
        }

        if depth >= MIN_ETC_DEPTH
            && let Some(score) =
                enhanced_transposition_cutoff(ctx, board, &move_list, depth, alpha, beta, tt_key)
        {
            return score;
        }

        if let Some(score) = probcut::probcut_midgame(ctx, board, depth, alpha, beta, thread) {
            return score;
        }
    }

    // Internal iterative deepening: a PV node without a hash move runs a
    // reduced search to obtain one for ordering.
    if NT::PV_NODE && !NT::ROOT_NODE && tt_move == Square::None && depth >= IID_MIN_DEPTH {
        search::<PV>(ctx, board, depth - 2, alpha, beta, thread);
        if thread.is_search_aborted() || thread.cutoff_occurred() {
            return 0;
        }
        tt_move = ctx.tt.probe(tt_key).map_or(Square::None, |d| d.move1);
    }

    if move_list.count() > 1 {
        move_list.evaluate_moves::<NT>(ctx, board, depth, (tt_move, tt_move2));
        move_list.sort();
    }

    let move_iter = Arc::new(ConcurrentMoveIterator::new(move_list));
    let mut best_move = Square::None;
    let mut best_score = -SCORE_INF;

    while let Some((mv, move_count)) = move_iter.next() {
        let next = board.make_move_with_flipped(mv.flipped, mv.sq);
        ctx.update(mv);

        let mut score = -SCORE_INF;
        if depth >= 2 && mv.reduction_depth > 0 {
            let d = (depth - 1).saturating_sub(mv.reduction_depth);
            score = -search::<NonPV>(ctx, &next, d, -(alpha + 1), -alpha, thread);
            if score > alpha {
                score = -search::<NonPV>(ctx, &next, depth - 1, -(alpha + 1), -alpha, thread);
            }
        } else if !NT::PV_NODE || move_count > 1 {
            score = -search::<NonPV>(ctx, &next, depth - 1, -(alpha + 1), -alpha, thread);
        }

        if NT::PV_NODE && (move_count == 1 || score > alpha) {
            ctx.clear_pv();
            score = -search::<PV>(ctx, &next, depth - 1, -beta, -alpha, thread);
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

        // Offer the remaining brothers to idle workers once the eldest has
        // returned.
        if depth >= MIN_SPLIT_DEPTH && move_iter.remaining() >= 2 && thread.can_split() {
            let (s, m, n) = thread.split(
                ctx,
                board,
                alpha,
                beta,
                best_score,
                best_move,
                depth,
                &move_iter,
                NT::TYPE_ID,
            );
            best_score = s;
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
        depth,
        org_alpha,
        beta,
        best_score,
        best_move,
        PV_HASH_HEIGHT,
    );

    best_score
}

/// Continuation of [`search`] executed by threads attached to a split
/// point; window state lives in the split point, not in locals.
pub fn search_sp<NT: NodeType>(
    ctx: &mut SearchContext,
    board: &Board,
    depth: Depth,
    thread: &Arc<Thread>,
    split_point: &Arc<SplitPoint>,
) -> Score {
    let beta = split_point.state().beta;
    let move_iter = split_point.state().move_iter.clone().unwrap();

    while let Some((mv, move_count)) = move_iter.next() {
        split_point.unlock();

        let next = board.make_move_with_flipped(mv.flipped, mv.sq);
        ctx.update(mv);

        let alpha = split_point.state().alpha();
        let mut score = -SCORE_INF;
        if depth >= 2 && mv.reduction_depth > 0 {
            let d = (depth - 1).saturating_sub(mv.reduction_depth);
            score = -search::<NonPV>(ctx, &next, d, -(alpha + 1), -alpha, thread);
            if score > alpha {
                let alpha = split_point.state().alpha();
                score = -search::<NonPV>(ctx, &next, depth - 1, -(alpha + 1), -alpha, thread);
            }
        } else if !NT::PV_NODE || move_count > 1 {
            score = -search::<NonPV>(ctx, &next, depth - 1, -(alpha + 1), -alpha, thread);
        }

        if NT::PV_NODE && score > alpha {
            ctx.clear_pv();
            let alpha = split_point.state().alpha();
            score = -search::<PV>(ctx, &next, depth - 1, -beta, -alpha, thread);
        }

        ctx.undo(mv);

        split_point.lock();

        if thread.is_search_aborted() || thread.cutoff_occurred() {
            return 0;
        }

        let sp = split_point.state();

        if NT::ROOT_NODE {
            ctx.update_root_move(mv.sq, score, move_count, sp.alpha());
        }

        if score > sp.best_score() {
            sp.set_best_score(score);

            if score > sp.alpha() {
                sp.set_best_move(mv.sq);

                if NT::PV_NODE && !NT::ROOT_NODE {
                    ctx.update_pv(mv.sq);
                    split_point.state_mut().copy_pv(ctx.get_pv());
                }

                if NT::PV_NODE && score < beta {
                    sp.set_alpha(score);
                } else {
                    sp.set_cutoff(true);
                    break;
                }
            }
        }
    }

    split_point.state().best_score()
}

/// Two-ply evaluation with heuristic move ordering.
pub fn evaluate_depth2(
    ctx: &mut SearchContext,
    board: &Board,
    mut alpha: Score,
    beta: Score,
) -> Score {
    let mut move_list = MoveList::new(board);
    if move_list.count() == 0 {
        let next = board.switch_players();
        if next.has_legal_moves() {
            ctx.update_pass();
            let score = -evaluate_depth2(ctx, &next, -beta, -alpha);
            ctx.undo_pass();
            return score;
        }
        return solve(board, ctx.empty_list.count);
    }

    let mut best_score = -SCORE_INF;
    if move_list.count() >= 3 {
        move_list.evaluate_moves_fast(board, Square::None, ctx.empty_list.parity);
        for mv in move_list.best_first_iter() {
            let next = board.make_move_with_flipped(mv.flipped, mv.sq);
            ctx.update(mv);
            let score = -evaluate_depth1(ctx, &next, -beta, -alpha);
            ctx.undo(mv);

            if score > best_score {
                best_score = score;
                if score >= beta {
                    break;
                }
                alpha = alpha.max(score);
            }
        }
    } else {
        for mv in move_list.iter() {
            let next = board.make_move_with_flipped(mv.flipped, mv.sq);
            ctx.update(mv);
            let score = -evaluate_depth1(ctx, &next, -beta, -alpha);
            ctx.undo(mv);

            if score > best_score {
                best_score = score;
                if score >= beta {
                    break;
                }
                alpha = alpha.max(score);
            }
        }
    }

    best_score
}

/// One-ply evaluation.
pub fn evaluate_depth1(
    ctx: &mut SearchContext,
    board: &Board,
    alpha: Score,
    beta: Score,
) -> Score {
    let moves = board.get_moves();
    if moves == 0 {
        let next = board.switch_players();
        if next.has_legal_moves() {
            ctx.update_pass();
            let score = -evaluate_depth1(ctx, &next, -beta, -alpha);
            ctx.undo_pass();
            return score;
        }
        return solve(board, ctx.empty_list.count);
    }

    let mut best_score = -SCORE_INF;
    for sq in BitboardIterator::new(moves) {
        let flipped = flip::flip(sq, board.player, board.opponent);
        if flipped == board.opponent {
            return MID_SCORE_MAX;
        }
        let next = board.make_move_with_flipped(flipped, sq);
        let mv = crate::move_list::Move::new(sq, flipped);

        ctx.update(&mv);
        let score = -evaluate(ctx, &next);
        ctx.undo(&mv);

        if score > best_score {
            best_score = score;
            if score >= beta {
                break;
            }
        }
    }

    best_score
}

/// Plain fixed-depth alpha-beta without tables, used only to order moves.
pub fn shallow_search(
    ctx: &mut SearchContext,
    board: &Board,
    depth: Depth,
    mut alpha: Score,
    beta: Score,
) -> Score {
    match depth {
        0 => return evaluate(ctx, board),
        1 => return evaluate_depth1(ctx, board, alpha, beta),
        2 => return evaluate_depth2(ctx, board, alpha, beta),
        _ => {}
    }

    let mut move_list = MoveList::new(board);
    if move_list.count() == 0 {
        let next = board.switch_players();
        if next.has_legal_moves() {
            ctx.update_pass();
            let score = -shallow_search(ctx, &next, depth, -beta, -alpha);
            ctx.undo_pass();
            return score;
        }
        return solve(board, ctx.empty_list.count);
    }
    if move_list.wipeout_move.is_some() {
        return MID_SCORE_MAX;
    }

    move_list.evaluate_moves_fast(board, Square::None, ctx.empty_list.parity);
    let mut best_score = -SCORE_INF;
    for mv in move_list.best_first_iter() {
        let next = board.make_move_with_flipped(mv.flipped, mv.sq);
        ctx.update(mv);
        let score = -shallow_search(ctx, &next, depth - 1, -beta, -alpha);
        ctx.undo(mv);

        if score > best_score {
            best_score = score;
            if score >= beta {
                break;
            }
            alpha = alpha.max(score);
        }
    }

    best_score
}

/// Leaf evaluation in scaled units; finished games score exactly.
#[inline(always)]
pub fn evaluate(ctx: &SearchContext, board: &Board) -> Score {
    let ply = ctx.ply();
    if ply == 60 {
        return crate::constants::to_midgame_score(endgame::final_score(board));
    }
    ctx.eval.score(ctx.features.features(ply, ctx.side_to_move), ply)
}

/// Exact score of a doubly-passed position, in scaled units.
fn solve(board: &Board, n_empties: Depth) -> Score {
    crate::constants::to_midgame_score(endgame::solve(board, n_empties))
}

/// Stability cutoff in scaled units.
fn stability_cutoff(board: &Board, n_empties: Depth, alpha: Score) -> Option<Score> {
    stability::stability_cutoff(board, n_empties, alpha >> EVAL_SCORE_SCALE_BITS)
        .map(crate::constants::to_midgame_score)
}
