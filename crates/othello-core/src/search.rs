//! Search façade and the pieces shared between the midgame and endgame
//! searches.

pub mod endgame;
pub mod endgame_cache;
pub mod midgame;
pub mod node_type;
pub mod options;
pub mod root_move;
pub mod search_context;
pub mod search_result;
pub mod side_to_move;
pub mod threading;
pub mod time_control;

use std::sync::{Arc, Weak};
use std::time::Instant;

use tracing::info;

use crate::board::Board;
use crate::constants::MAX_THREADS;
use crate::eval::Eval;
use crate::level::{self, Level, MAX_LEVEL};
use crate::move_list::MoveList;
use crate::search::node_type::NodeType;
use crate::search::search_context::SearchContext;
use crate::search::search_result::SearchResult;
use crate::search::threading::{Thread, ThreadPool};
use crate::search::time_control::TimeManager;
use crate::square::Square;
use crate::transposition_table::TranspositionTable;
use crate::types::{Depth, Score, Scoref, Selectivity};

pub use options::{EngineError, SearchOptions, SearchRunOptions};

/// PV table size in mebibytes; it only keeps near-root exact entries.
const PV_TABLE_MB: usize = 2;

/// Iteration progress handed to the observer callback.
pub struct SearchProgress {
    pub depth: Depth,
    pub score: Scoref,
    pub best_move: Square,
    /// Confidence of the score in percent.
    pub probability: i32,
    pub n_nodes: u64,
    pub pv_line: Vec<Square>,
    pub is_endgame: bool,
}

/// Observer invoked at every completed iteration.
pub type SearchProgressCallback = dyn Fn(SearchProgress) + Send + Sync + 'static;

/// Work order handed to the thread pool for one run.
pub struct SearchTask {
    pub board: Board,
    pub selectivity: Selectivity,
    pub tt: Arc<TranspositionTable>,
    pub pv_table: Arc<TranspositionTable>,
    pub pool: Weak<ThreadPool>,
    pub eval: Arc<Eval>,
    pub level: Level,
    pub callback: Option<Arc<SearchProgressCallback>>,
    pub time_manager: Option<Arc<TimeManager>>,
}

/// The engine: owns the tables, evaluator and worker pool, and drives runs
/// to completion or cooperative abort.
pub struct Search {
    tt: Arc<TranspositionTable>,
    pv_table: Arc<TranspositionTable>,
    threads: Arc<ThreadPool>,
    eval: Arc<Eval>,
    level: Level,
}

impl Search {
    /// Builds an engine. Configuration problems (weight file, level) are
    /// fatal and surface here; nothing fails later.
    pub fn new(options: &SearchOptions) -> Result<Search, EngineError> {
        if options.level > MAX_LEVEL {
            return Err(EngineError::InvalidLevel(options.level));
        }
        let eval = Eval::with_weight_file(options.eval_path.as_deref())?;

        crate::init();

        let n_threads = options.n_threads.min(num_cpus::get()).clamp(1, MAX_THREADS);
        info!(
            threads = n_threads,
            hash_mb = options.tt_mb_size,
            level = options.level,
            "search engine ready"
        );

        Ok(Search {
            tt: Arc::new(TranspositionTable::new(options.tt_mb_size)),
            pv_table: Arc::new(TranspositionTable::new(PV_TABLE_MB)),
            threads: ThreadPool::new(n_threads),
            eval: Arc::new(eval),
            level: level::get_level(options.level),
        })
    }

    /// Resets all cached state for a new game.
    pub fn init(&mut self) {
        self.tt.clear();
        self.pv_table.clear();
    }

    /// Ages the cached state between searches of the same game.
    pub fn cleanup(&self) {
        self.tt.increment_date();
        self.pv_table.increment_date();
    }

    /// Reconfigures the strength level; only legal while idle.
    pub fn set_level(&mut self, level: usize) -> Result<(), EngineError> {
        if self.threads.is_thinking() {
            return Err(EngineError::SearchRunning);
        }
        if level > MAX_LEVEL {
            return Err(EngineError::InvalidLevel(level));
        }
        self.level = level::get_level(level);
        Ok(())
    }

    /// Replaces the main hash table; only legal while idle.
    pub fn resize_hash(&mut self, mb_size: usize) -> Result<(), EngineError> {
        if self.threads.is_thinking() {
            return Err(EngineError::SearchRunning);
        }
        self.tt = Arc::new(TranspositionTable::new(mb_size));
        Ok(())
    }

    /// Rebuilds the worker pool with a new thread count; only legal while
    /// idle.
    pub fn set_threads(&mut self, n_threads: usize) -> Result<(), EngineError> {
        if self.threads.is_thinking() {
            return Err(EngineError::SearchRunning);
        }
        let n_threads = n_threads.min(num_cpus::get()).clamp(1, MAX_THREADS);
        self.threads = ThreadPool::new(n_threads);
        Ok(())
    }

    /// Runs a search on `board` for the side to move. Returns the best
    /// result found, which on a timeout or abort is the best completed
    /// iteration's.
    pub fn run(&mut self, board: &Board, options: &SearchRunOptions) -> SearchResult {
        let start = Instant::now();
        self.cleanup();

        let time_manager = match options.time {
            time_control::TimeControlMode::Infinite => None,
            mode => Some(Arc::new(TimeManager::new(mode, board.get_empty_count()))),
        };

        let task = SearchTask {
            board: *board,
            selectivity: options.selectivity,
            tt: self.tt.clone(),
            pv_table: self.pv_table.clone(),
            pool: Arc::downgrade(&self.threads),
            eval: self.eval.clone(),
            level: self.level,
            callback: options.callback.clone(),
            time_manager: time_manager.clone(),
        };

        if let Some(ref tm) = time_manager
            && tm.deadline().is_some()
        {
            self.threads.start_timer(tm.clone());
        }

        let receiver = self.threads.start_thinking(task);
        let mut result = receiver.recv().expect("search thread died");

        self.threads.stop_timer();
        result.time_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Raises the cooperative stop flag of the running search.
    pub fn abort(&self) {
        self.threads.stop_timer();
        self.threads.abort_search();
    }

    pub fn is_aborted(&self) -> bool {
        self.threads.is_aborted()
    }

    /// Rebuilds the principal variation from the PV table (falling back to
    /// the main table), validating every move on the way.
    pub fn extract_pv(&self, board: &Board) -> Vec<Square> {
        let mut pv = Vec::new();
        let mut b = *board;
        let mut passed = false;

        while pv.len() < 60 {
            if !b.has_legal_moves() {
                if passed {
                    break;
                }
                passed = true;
                b = b.switch_players();
                continue;
            }
            passed = false;

            let data = self
                .pv_table
                .probe(b.hash())
                .or_else(|| self.tt.probe(b.hash()));
            let Some(data) = data else { break };
            if data.move1 == Square::None || !b.is_legal_move(data.move1) {
                break;
            }
            pv.push(data.move1);
            b = b.make_move(data.move1);
        }

        pv
    }
}

/// Picks the search family for a task: endgame once the level's most
/// selective solve horizon covers the position.
pub(crate) fn search_root(task: SearchTask, thread: &Arc<Thread>) -> SearchResult {
    // The driver handles passing; a search on a move-less position reports
    // a null result instead of inventing one.
    if task.board.get_moves() == 0 {
        return SearchResult {
            score: 0.0,
            best_move: None,
            n_nodes: 0,
            pv_line: Vec::new(),
            depth: 0,
            selectivity: task.selectivity,
            is_endgame: false,
            time_ms: 0,
        };
    }

    let n_empties = task.board.get_empty_count();
    if task.level.get_end_depth(1) >= n_empties {
        endgame::search_root(task, thread)
    } else {
        midgame::search_root(task, thread)
    }
}

/// Enhanced transposition cutoff: probe each child's entry before paying
/// for recursion. A child whose upper bound refutes `beta` proves a
/// fail-high here; if every child is already proven `<= alpha`, the node
/// fails low without a search. Scores in scaled units.
pub(crate) fn enhanced_transposition_cutoff(
    ctx: &mut SearchContext,
    board: &Board,
    move_list: &MoveList,
    depth: Depth,
    alpha: Score,
    beta: Score,
    tt_key: u64,
) -> Option<Score> {
    let etc_depth = depth - 1;
    let mut all_below_alpha = true;

    for mv in move_list.iter() {
        let next = board.make_move_with_flipped(mv.flipped, mv.sq);
        ctx.increment_nodes();

        match ctx.tt.probe(next.hash()) {
            Some(data) if data.covers(etc_depth, ctx.selectivity) => {
                // child upper bound: our score from this move >= -upper
                if -data.upper >= beta {
                    ctx.tt
                        .store(tt_key, 0, depth, ctx.selectivity, beta - 1, beta, beta, mv.sq);
                    return Some(beta);
                }
                // child lower bound: our score from this move <= -lower
                if -data.lower > alpha {
                    all_below_alpha = false;
                }
            }
            _ => all_below_alpha = false,
        }
    }

    if all_below_alpha && move_list.count() > 0 {
        return Some(alpha);
    }
    None
}

/// Writes a finished node to the tables: exact PV results overwrite
/// unconditionally and near-root ones also feed the PV table; bounds go
/// through the replacement policy.
#[allow(clippy::too_many_arguments)]
pub(crate) fn store_result<NT: NodeType>(
    ctx: &mut SearchContext,
    key: u64,
    nodes_at_entry: u64,
    depth: Depth,
    org_alpha: Score,
    beta: Score,
    best_score: Score,
    best_move: Square,
    pv_hash_height: usize,
) {
    let cost = ((ctx.n_nodes - nodes_at_entry) | 1).ilog2();
    let exact = NT::PV_NODE && best_score > org_alpha && best_score < beta;

    if exact {
        ctx.tt.force_store(
            key,
            cost,
            depth,
            ctx.selectivity,
            org_alpha,
            beta,
            best_score,
            best_move,
        );
        if ctx.height() <= pv_hash_height {
            ctx.pv_table.force_store(
                key,
                cost,
                depth,
                ctx.selectivity,
                org_alpha,
                beta,
                best_score,
                best_move,
            );
        }
    } else {
        ctx.tt.store(
            key,
            cost,
            depth,
            ctx.selectivity,
            org_alpha,
            beta,
            best_score,
            best_move,
        );
    }
}
