use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arrayvec::ArrayVec;

use crate::board::Board;
use crate::constants::{MAX_PLY, SCORE_INF};
use crate::empty_list::EmptyList;
use crate::eval::{Eval, FeatureSet};
use crate::move_list::{Move, MoveList};
use crate::probcut::NO_SELECTIVITY;
use crate::search::root_move::RootMove;
use crate::search::side_to_move::SideToMove;
use crate::search::threading::SplitPoint;
use crate::search::{SearchProgress, SearchProgressCallback};
use crate::square::Square;
use crate::transposition_table::TranspositionTable;
use crate::types::{Depth, Score, Scoref, Selectivity};

/// Phase of the current search, deciding which search family runs at split
/// points.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    MidGame,
    EndGame,
}

/// Principal-variation buffer length: the longest line plus a terminator.
pub const PV_LEN: usize = MAX_PLY + 1;

#[derive(Clone, Copy)]
struct PlyRecord {
    pv: [Square; PV_LEN],
}

/// Per-thread search state: the empty list and feature stack evolve with
/// the tree walk while the tables and evaluator are shared.
pub struct SearchContext {
    pub n_nodes: u64,
    pub side_to_move: SideToMove,
    pub selectivity: Selectivity,
    pub game_phase: GamePhase,
    pub empty_list: EmptyList,
    pub features: FeatureSet,
    pub tt: Arc<TranspositionTable>,
    pub pv_table: Arc<TranspositionTable>,
    pub eval: Arc<Eval>,
    pub root_moves: Arc<Mutex<Vec<RootMove>>>,
    pub callback: Option<Arc<SearchProgressCallback>>,
    /// Cooperative stop flag, shared with the pool and its timer.
    stop: Arc<AtomicBool>,
    root_ply: usize,
    stack: Box<[PlyRecord]>,
}

impl SearchContext {
    pub fn new(
        board: &Board,
        selectivity: Selectivity,
        tt: Arc<TranspositionTable>,
        pv_table: Arc<TranspositionTable>,
        eval: Arc<Eval>,
        stop: Arc<AtomicBool>,
    ) -> SearchContext {
        let empty_list = EmptyList::new(board);
        let ply = empty_list.ply();
        SearchContext {
            n_nodes: 0,
            side_to_move: SideToMove::Player,
            selectivity,
            game_phase: GamePhase::MidGame,
            features: FeatureSet::new(board, ply),
            empty_list,
            tt,
            pv_table,
            eval,
            root_moves: Arc::new(Mutex::new(Self::create_root_moves(board))),
            callback: None,
            stop,
            root_ply: ply,
            stack: vec![
                PlyRecord {
                    pv: [Square::None; PV_LEN],
                };
                PV_LEN + 1
            ]
            .into_boxed_slice(),
        }
    }

    /// True once the driver, the timer, or a cutting ancestor asked the
    /// search to unwind. Observed at node entry and in solver loops; a
    /// stopped context must not store results.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Clone of the stop flag for split-point hand-off.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Builds the context of a helper thread joining `sp`; shares the
    /// tables and root moves, clones the tree-walk state.
    pub fn from_split_point(sp: &Arc<SplitPoint>) -> SearchContext {
        let state = sp.state();
        let task = state.task.as_ref().expect("split point without task");
        let empty_list = task.empty_list.clone();
        let ply = empty_list.ply();
        let root_view = if task.side_to_move == SideToMove::Player {
            task.board
        } else {
            task.board.switch_players()
        };
        SearchContext {
            n_nodes: 0,
            side_to_move: task.side_to_move,
            selectivity: task.selectivity,
            game_phase: task.game_phase,
            features: FeatureSet::new(&root_view, ply),
            empty_list,
            tt: task.tt.clone(),
            pv_table: task.pv_table.clone(),
            eval: task.eval.clone(),
            root_moves: task.root_moves.clone(),
            callback: None,
            stop: task.stop.clone(),
            root_ply: task.root_ply,
            stack: vec![
                PlyRecord {
                    pv: [Square::None; PV_LEN],
                };
                PV_LEN + 1
            ]
            .into_boxed_slice(),
        }
    }

    fn create_root_moves(board: &Board) -> Vec<RootMove> {
        MoveList::new(board)
            .iter()
            .map(|m| RootMove::new(m.sq))
            .collect()
    }

    /// Current ply, derived from the empty count.
    #[inline]
    pub fn ply(&self) -> usize {
        self.empty_list.ply()
    }

    /// Distance from the search root.
    #[inline]
    pub fn height(&self) -> usize {
        self.ply() - self.root_ply
    }

    /// Ply of the search root.
    #[inline]
    pub fn root_ply(&self) -> usize {
        self.root_ply
    }

    #[inline]
    pub fn increment_nodes(&mut self) {
        self.n_nodes += 1;
    }

    /// Applies a midgame move: feature delta, side switch, empty unlink.
    #[inline]
    pub fn update(&mut self, mv: &Move) {
        self.n_nodes += 1;
        let ply = self.ply();
        self.features.update(mv.sq, mv.flipped, ply, self.side_to_move);
        self.side_to_move = self.side_to_move.switch();
        self.empty_list.remove(mv.sq);
    }

    /// Unwinds [`SearchContext::update`]; the feature stack needs no
    /// inverse delta.
    #[inline]
    pub fn undo(&mut self, mv: &Move) {
        self.empty_list.restore(mv.sq);
        self.side_to_move = self.side_to_move.switch();
    }

    /// Applies an endgame move; the solver band never evaluates, so the
    /// feature stack and perspective stay untouched.
    #[inline]
    pub fn update_endgame(&mut self, sq: Square) {
        self.n_nodes += 1;
        self.empty_list.remove(sq);
    }

    #[inline]
    pub fn undo_endgame(&mut self, sq: Square) {
        self.empty_list.restore(sq);
    }

    /// Applies a pass: the board is unchanged, only the perspective flips.
    #[inline]
    pub fn update_pass(&mut self) {
        self.n_nodes += 1;
        self.side_to_move = self.side_to_move.switch();
    }

    #[inline]
    pub fn undo_pass(&mut self) {
        self.side_to_move = self.side_to_move.switch();
    }

    /// Disables nested speculative cutoffs for a verification search.
    #[inline]
    pub fn enter_probcut(&mut self) {
        self.selectivity = NO_SELECTIVITY;
    }

    #[inline]
    pub fn leave_probcut(&mut self, saved: Selectivity) {
        self.selectivity = saved;
    }

    /// Records `sq` as the best move at the current ply and splices the
    /// child line behind it.
    pub fn update_pv(&mut self, sq: Square) {
        let ply = self.ply();
        let (head, tail) = self.stack.split_at_mut(ply + 1);
        let line = &mut head[ply].pv;
        let child = &tail[0].pv;
        line[0] = sq;
        let mut i = 0;
        while i + 1 < PV_LEN && child[i] != Square::None {
            line[i + 1] = child[i];
            i += 1;
        }
        line[i + 1] = Square::None;
    }

    /// Clears the line at the current ply before a re-search.
    pub fn clear_pv(&mut self) {
        let ply = self.ply();
        self.stack[ply].pv.fill(Square::None);
    }

    /// The line at the current ply, for split-point hand-off.
    #[inline]
    pub fn get_pv(&self) -> &[Square; PV_LEN] {
        &self.stack[self.ply()].pv
    }

    /// Installs a line at the current ply, for split-point hand-back.
    #[inline]
    pub fn set_pv(&mut self, pv: &[Square; PV_LEN]) {
        let ply = self.ply();
        self.stack[ply].pv = *pv;
    }

    /// The root line, bounded by the longest possible game.
    pub fn root_pv_line(&self) -> ArrayVec<Square, MAX_PLY> {
        self.stack[self.root_ply]
            .pv
            .iter()
            .copied()
            .take_while(|&sq| sq != Square::None)
            .take(MAX_PLY)
            .collect()
    }

    /// Publishes a root move's result; fail-lows are demoted so the best
    /// scored move rises during sorting.
    pub fn update_root_move(&mut self, sq: Square, score: Score, move_count: usize, alpha: Score) {
        let is_pv = move_count == 1 || score > alpha;
        if is_pv {
            self.update_pv(sq);
        }
        let line = if is_pv {
            self.root_pv_line()
        } else {
            ArrayVec::new()
        };

        let mut root_moves = self.root_moves.lock().unwrap();
        if let Some(rm) = root_moves.iter_mut().find(|rm| rm.sq == sq) {
            if is_pv {
                rm.score = score;
                rm.pv = line;
            } else {
                rm.score = -SCORE_INF;
            }
        }
    }

    /// Best root move by current score. With `skip_searched`, moves already
    /// finalized this depth are ignored.
    pub fn get_best_root_move(&self, skip_searched: bool) -> Option<RootMove> {
        let root_moves = self.root_moves.lock().unwrap();
        root_moves
            .iter()
            .filter(|rm| !skip_searched || !rm.searched)
            .max_by_key(|rm| rm.score)
            .cloned()
    }

    pub fn mark_root_move_searched(&mut self, sq: Square) {
        let mut root_moves = self.root_moves.lock().unwrap();
        if let Some(rm) = root_moves.iter_mut().find(|rm| rm.sq == sq) {
            rm.searched = true;
        }
    }

    pub fn is_move_searched(&self, sq: Square) -> bool {
        let root_moves = self.root_moves.lock().unwrap();
        root_moves.iter().any(|rm| rm.sq == sq && rm.searched)
    }

    /// Snapshots iteration scores for the next aspiration window.
    pub fn save_previous_scores(&mut self) {
        let mut root_moves = self.root_moves.lock().unwrap();
        for rm in root_moves.iter_mut() {
            if rm.score != -SCORE_INF {
                rm.previous_score = rm.score;
            }
        }
    }

    pub fn root_moves_count(&self) -> usize {
        self.root_moves.lock().unwrap().len()
    }

    pub fn set_callback(&mut self, callback: Arc<SearchProgressCallback>) {
        self.callback = Some(callback);
    }

    /// Reports iteration progress through the observer, if any.
    #[allow(clippy::too_many_arguments)]
    pub fn notify_progress(
        &self,
        depth: Depth,
        score: Scoref,
        best_move: Square,
        selectivity: Selectivity,
        pv_line: Vec<Square>,
        is_endgame: bool,
    ) {
        tracing::debug!(
            depth,
            score,
            best_move = %best_move,
            selectivity,
            n_nodes = self.n_nodes,
            "iteration complete"
        );
        if let Some(ref callback) = self.callback {
            callback(SearchProgress {
                depth,
                score,
                best_move,
                probability: crate::probcut::get_probability(selectivity),
                n_nodes: self.n_nodes,
                pv_line,
                is_endgame,
            });
        }
    }
}
