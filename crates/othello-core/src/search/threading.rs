//! Young-brothers-wait worker pool.
//!
//! Long-lived worker threads park on condvars between searches. A node that
//! has finished its eldest brother may publish its remaining moves as a
//! split point; idle workers attach, pull moves from the shared iterator
//! and update the split point's window under its spinlock. A beta cutoff
//! raises the split point's cutoff flag, which every attached worker polls,
//! and an aborted worker returns without storing partial results.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use lock_api::RawMutex;

use crate::board::Board;
use crate::empty_list::EmptyList;
use crate::eval::Eval;
use crate::move_list::ConcurrentMoveIterator;
use crate::search::node_type::{NodeType, NonPV, PV, Root};
use crate::search::root_move::RootMove;
use crate::search::search_context::{GamePhase, PV_LEN, SearchContext};
use crate::search::search_result::SearchResult;
use crate::search::side_to_move::SideToMove;
use crate::search::time_control::TimeManager;
use crate::search::{SearchTask, endgame, midgame, search_root};
use crate::square::Square;
use crate::transposition_table::TranspositionTable;
use crate::types::{Depth, Score, Selectivity};
use crate::util::bitset::AtomicBitSet;
use crate::util::spinlock::RawSpinLock;

/// Split points one thread may own simultaneously.
const MAX_SPLITPOINTS_PER_THREAD: usize = 8;

/// Workers that may attach to a single split point.
const MAX_WORKERS_PER_SPLITPOINT: u32 = 5;

/// Timer thread polling interval.
const TIMER_INTERVAL: Duration = Duration::from_millis(1);

/// Everything a helper needs to reconstruct the search at the split node.
pub struct SplitPointTask {
    pub board: Board,
    pub side_to_move: SideToMove,
    pub selectivity: Selectivity,
    pub game_phase: GamePhase,
    pub root_ply: usize,
    pub tt: Arc<TranspositionTable>,
    pub pv_table: Arc<TranspositionTable>,
    pub root_moves: Arc<Mutex<Vec<RootMove>>>,
    pub eval: Arc<Eval>,
    pub empty_list: EmptyList,
    pub stop: Arc<AtomicBool>,
}

/// Mutable state of one split point, guarded by the split point's spinlock
/// except for the fields workers update atomically mid-move.
pub struct SplitPointState {
    /// True while every attached worker is actively searching.
    all_workers_searching: AtomicBool,

    alpha: AtomicI32,
    pub beta: Score,
    best_score: AtomicI32,
    best_move: AtomicU8,

    /// Shared move hand-out for this node.
    pub move_iter: Option<Arc<ConcurrentMoveIterator>>,

    node_type: u32,
    cutoff: AtomicBool,
    owner_thread_idx: usize,

    /// Which threads currently work on this split point.
    workers_mask: AtomicBitSet,

    depth: Depth,
    n_nodes: AtomicU64,

    pub task: Option<SplitPointTask>,
    parent_split_point: Option<Arc<SplitPoint>>,

    /// Best line found below this split point.
    pv: [Square; PV_LEN],
}

impl SplitPointState {
    #[inline]
    pub fn alpha(&self) -> Score {
        self.alpha.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_alpha(&self, value: Score) {
        self.alpha.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn best_score(&self) -> Score {
        self.best_score.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_best_score(&self, value: Score) {
        self.best_score.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn best_move(&self) -> Square {
        Square::from_u8_unchecked(self.best_move.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_best_move(&self, value: Square) {
        self.best_move.store(value as u8, Ordering::Relaxed);
    }

    #[inline]
    pub fn cutoff(&self) -> bool {
        self.cutoff.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_cutoff(&self, value: bool) {
        self.cutoff.store(value, Ordering::Relaxed);
    }

    #[inline]
    fn all_workers_searching(&self) -> bool {
        self.all_workers_searching.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_all_workers_searching(&self, value: bool) {
        self.all_workers_searching.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn n_nodes(&self) -> u64 {
        self.n_nodes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn add_nodes(&self, count: u64) {
        self.n_nodes.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn copy_pv(&mut self, src: &[Square; PV_LEN]) {
        self.pv.copy_from_slice(src);
    }

    #[inline]
    pub fn pv(&self) -> &[Square; PV_LEN] {
        &self.pv
    }
}

/// A split point: spinlock plus its guarded state.
pub struct SplitPoint {
    mutex: RawSpinLock,
    state: UnsafeCell<SplitPointState>,
}

unsafe impl Sync for SplitPoint {}

impl Default for SplitPoint {
    fn default() -> Self {
        SplitPoint {
            mutex: RawSpinLock::INIT,
            state: UnsafeCell::new(SplitPointState {
                all_workers_searching: AtomicBool::new(false),
                alpha: AtomicI32::new(0),
                beta: 0,
                best_score: AtomicI32::new(0),
                best_move: AtomicU8::new(Square::None as u8),
                move_iter: None,
                node_type: 0,
                cutoff: AtomicBool::new(false),
                owner_thread_idx: 0,
                workers_mask: AtomicBitSet::new(),
                depth: 0,
                n_nodes: AtomicU64::new(0),
                task: None,
                parent_split_point: None,
                pv: [Square::None; PV_LEN],
            }),
        }
    }
}

impl SplitPoint {
    #[inline]
    pub fn state(&self) -> &SplitPointState {
        unsafe { &*self.state.get() }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn state_mut(&self) -> &mut SplitPointState {
        unsafe { &mut *self.state.get() }
    }

    #[inline]
    pub fn lock(&self) {
        self.mutex.lock();
    }

    #[inline]
    pub fn unlock(&self) {
        unsafe { self.mutex.unlock() };
    }
}

struct ThreadState {
    active_split_point: Option<Arc<SplitPoint>>,
    split_points_size: usize,
    split_points: [Arc<SplitPoint>; MAX_SPLITPOINTS_PER_THREAD],
}

/// One worker of the pool.
pub struct Thread {
    sleep_mutex: Mutex<()>,
    sleep_condition: Condvar,
    state_lock: RawSpinLock,
    idx: usize,
    pool: Weak<ThreadPool>,
    thinking: Arc<AtomicBool>,
    state: UnsafeCell<ThreadState>,
    ready: AtomicBool,
    searching: AtomicBool,
    exit: AtomicBool,
}

unsafe impl Sync for Thread {}

impl Thread {
    fn new(idx: usize, thinking: Arc<AtomicBool>, pool: Weak<ThreadPool>) -> Thread {
        Thread {
            sleep_mutex: Mutex::new(()),
            sleep_condition: Condvar::new(),
            state_lock: RawSpinLock::INIT,
            idx,
            pool,
            thinking,
            state: UnsafeCell::new(ThreadState {
                active_split_point: None,
                split_points_size: 0,
                split_points: std::array::from_fn(|_| Arc::new(SplitPoint::default())),
            }),
            ready: AtomicBool::new(false),
            searching: AtomicBool::new(false),
            exit: AtomicBool::new(false),
        }
    }

    fn lock(&self) {
        self.state_lock.lock();
    }

    fn unlock(&self) {
        unsafe { self.state_lock.unlock() };
    }

    #[inline]
    fn state(&self) -> &ThreadState {
        unsafe { &*self.state.get() }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn state_mut(&self) -> &mut ThreadState {
        unsafe { &mut *self.state.get() }
    }

    fn notify_one(&self) {
        let _lock = self.sleep_mutex.lock();
        self.sleep_condition.notify_one();
    }

    /// Whether the pool-wide abort flag is raised.
    #[inline]
    pub fn is_search_aborted(&self) -> bool {
        self.pool.upgrade().is_some_and(|pool| pool.is_aborted())
    }

    /// The pool's abort flag, shared with search contexts so solver loops
    /// can poll it without reaching back into the pool.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.pool
            .upgrade()
            .map(|pool| pool.get_abort_flag())
            .unwrap_or_default()
    }

    /// True once any split point on this thread's path to the root has cut
    /// off; the worker should unwind without storing.
    pub fn cutoff_occurred(&self) -> bool {
        let mut current = self.state().active_split_point.as_ref();
        while let Some(sp) = current {
            let state = sp.state();
            if state.cutoff() {
                return true;
            }
            current = state.parent_split_point.as_ref();
        }
        false
    }

    /// A node may split when the pool has idle capacity and this thread has
    /// split-point slots left.
    pub fn can_split(&self) -> bool {
        let pool_size = self.pool.upgrade().map_or(1, |p| p.size) as u32;
        if pool_size <= 1 {
            return false;
        }

        let state = self.state();
        let has_room = if let Some(sp) = &state.active_split_point {
            let sp_state = sp.state();
            !sp_state.all_workers_searching()
                || pool_size > MAX_WORKERS_PER_SPLITPOINT
                    && sp_state.workers_mask.count() == MAX_WORKERS_PER_SPLITPOINT
        } else {
            true
        };

        has_room && state.split_points_size < MAX_SPLITPOINTS_PER_THREAD
    }

    /// An idle thread may join `sp` unless the helpful-owner rule forbids
    /// it: an owner of split points only helps threads working below its
    /// own newest split point.
    fn can_join(&self, sp: &Arc<SplitPoint>) -> bool {
        if self.searching.load(Ordering::Acquire) {
            return false;
        }

        let state = self.state();
        let size = state.split_points_size;
        if size == 0 {
            return true;
        }

        let own_sp_state = state.split_points[size - 1].state();
        own_sp_state.workers_mask.test(sp.state().owner_thread_idx)
    }

    /// Publishes the remaining moves of the current node and waits until
    /// every attached worker is done; returns the merged result.
    #[allow(clippy::too_many_arguments)]
    pub fn split(
        self: &Arc<Self>,
        ctx: &mut SearchContext,
        board: &Board,
        alpha: Score,
        beta: Score,
        best_score: Score,
        best_move: Square,
        depth: Depth,
        move_iter: &Arc<ConcurrentMoveIterator>,
        node_type: u32,
    ) -> (Score, Square, u64) {
        let state = self.state();
        let sp = state.split_points[state.split_points_size].clone();

        self.initialize_split_point(
            &sp, ctx, depth, best_score, best_move, alpha, beta, node_type, move_iter, board,
        );

        // The owner re-enters the idle loop as a worker of its own split
        // point; it returns once the worker mask drains.
        self.idle_loop();

        self.finalize_split_point(&sp);

        let sp_state = sp.state();
        ctx.set_pv(sp_state.pv());
        (sp_state.best_score(), sp_state.best_move(), sp_state.n_nodes())
    }

    #[allow(clippy::too_many_arguments)]
    fn initialize_split_point(
        &self,
        sp: &Arc<SplitPoint>,
        ctx: &SearchContext,
        depth: Depth,
        best_score: Score,
        best_move: Square,
        alpha: Score,
        beta: Score,
        node_type: u32,
        move_iter: &Arc<ConcurrentMoveIterator>,
        board: &Board,
    ) {
        debug_assert!(self.searching.load(Ordering::Acquire));

        sp.lock();
        let sp_state = sp.state_mut();
        sp_state.owner_thread_idx = self.idx;
        sp_state.parent_split_point = self.state().active_split_point.clone();
        sp_state.workers_mask.clear();
        sp_state.workers_mask.set(self.idx);
        sp_state.depth = depth;
        sp_state.set_best_score(best_score);
        sp_state.set_best_move(best_move);
        sp_state.set_alpha(alpha);
        sp_state.beta = beta;
        sp_state.node_type = node_type;
        sp_state.move_iter = Some(move_iter.clone());
        sp_state.task = Some(SplitPointTask {
            board: *board,
            side_to_move: ctx.side_to_move,
            selectivity: ctx.selectivity,
            game_phase: ctx.game_phase,
            root_ply: ctx.root_ply(),
            tt: ctx.tt.clone(),
            pv_table: ctx.pv_table.clone(),
            root_moves: ctx.root_moves.clone(),
            eval: ctx.eval.clone(),
            empty_list: ctx.empty_list.clone(),
            stop: ctx.stop_handle(),
        });
        sp_state.n_nodes.store(0, Ordering::Relaxed);
        sp_state.set_cutoff(false);
        sp_state.set_all_workers_searching(true);
        sp_state.copy_pv(ctx.get_pv());

        let thread_state = self.state_mut();
        thread_state.split_points_size += 1;
        thread_state.active_split_point = Some(sp.clone());

        self.pool.upgrade().unwrap().assign_workers(sp);

        sp.unlock();
    }

    fn finalize_split_point(&self, sp: &Arc<SplitPoint>) {
        debug_assert!(!self.searching.load(Ordering::Acquire));

        // decrementing split_points_size races with can_join, so take the
        // thread lock
        self.lock();
        self.searching.store(true, Ordering::Release);
        let state = self.state_mut();
        state.split_points_size -= 1;
        state.active_split_point = sp.state().parent_split_point.clone();
        self.unlock();

        sp.state_mut().task = None;
    }

    /// Worker main loop; also entered by split-point owners while they wait
    /// for their workers.
    fn idle_loop(self: &Arc<Self>) {
        let this_sp = self.state().active_split_point.clone();

        while !self.exit.load(Ordering::Acquire) {
            if let Some(ref sp) = this_sp
                && sp.state().workers_mask.none()
            {
                break;
            }

            while self.searching.load(Ordering::Acquire) {
                self.lock();
                let sp = self.state().active_split_point.clone().unwrap();
                self.unlock();

                let (board, depth, node_type) = {
                    sp.lock();
                    let state = sp.state();
                    let task = state.task.as_ref().unwrap();
                    (task.board, state.depth, state.node_type)
                };

                let mut ctx = SearchContext::from_split_point(&sp);
                self.dispatch_search(&mut ctx, &board, depth, node_type, &sp);

                self.lock();
                self.searching.store(false, Ordering::Release);
                self.unlock();

                // leaving the split point: the owner may free it right
                // after the unlock below
                let sp_state = sp.state_mut();
                sp_state.workers_mask.reset(self.idx);
                sp_state.set_all_workers_searching(false);
                sp_state.add_nodes(ctx.n_nodes);
                sp.unlock();

                self.try_late_join();
            }

            if !self.thinking.load(Ordering::Acquire) {
                debug_assert!(this_sp.is_none());

                let guard = self.sleep_mutex.lock().unwrap();
                self.ready.store(true, Ordering::Release);
                let _guard = self
                    .sleep_condition
                    .wait_while(guard, |_| {
                        !self.exit.load(Ordering::Acquire)
                            && !self.thinking.load(Ordering::Acquire)
                    })
                    .unwrap();
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Runs the split-point continuation matching the node's phase and
    /// type. The split point holds the lock on entry and exit.
    fn dispatch_search(
        self: &Arc<Self>,
        ctx: &mut SearchContext,
        board: &Board,
        depth: Depth,
        node_type: u32,
        sp: &Arc<SplitPoint>,
    ) {
        let is_endgame = ctx.game_phase == GamePhase::EndGame && ctx.empty_list.count == depth;

        match (is_endgame, node_type) {
            (true, NonPV::TYPE_ID) => {
                endgame::search_sp::<NonPV>(ctx, board, self, sp);
            }
            (true, PV::TYPE_ID) => {
                endgame::search_sp::<PV>(ctx, board, self, sp);
            }
            (true, Root::TYPE_ID) => {
                endgame::search_sp::<Root>(ctx, board, self, sp);
            }
            (false, NonPV::TYPE_ID) => {
                midgame::search_sp::<NonPV>(ctx, board, depth, self, sp);
            }
            (false, PV::TYPE_ID) => {
                midgame::search_sp::<PV>(ctx, board, depth, self, sp);
            }
            (false, Root::TYPE_ID) => {
                midgame::search_sp::<Root>(ctx, board, depth, self, sp);
            }
            _ => unreachable!("invalid node type {node_type}"),
        }
    }

    /// Work stealing: a freshly idle thread attaches to the most rootward
    /// split point that still has worker room.
    fn try_late_join(&self) {
        let pool = match self.pool.upgrade() {
            Some(pool) => pool,
            None => return,
        };

        let mut best_sp = None;
        let mut min_level = i32::MAX;
        for thread in &pool.threads {
            let size = thread.state().split_points_size;
            if size == 0 {
                continue;
            }

            let sp = &thread.state().split_points[size - 1];
            let sp_state = sp.state();
            if sp_state.all_workers_searching()
                && sp_state.workers_mask.count() < MAX_WORKERS_PER_SPLITPOINT
                && self.can_join(sp)
            {
                let mut level = 0;
                let mut active = &thread.state().active_split_point;
                while let Some(p) = active {
                    level += 1;
                    active = &p.state().parent_split_point;
                }

                if level < min_level {
                    min_level = level;
                    best_sp = Some(sp.clone());
                }
            }
        }

        if let Some(sp) = best_sp {
            sp.lock();
            let sp_state = sp.state_mut();
            // conditions may have changed; recheck under the lock
            if sp_state.all_workers_searching()
                && sp_state.workers_mask.count() < MAX_WORKERS_PER_SPLITPOINT
            {
                self.lock();
                if self.can_join(&sp) {
                    sp_state.workers_mask.set(self.idx);
                    self.state_mut().active_split_point = Some(sp.clone());
                    self.searching.store(true, Ordering::Release);
                }
                self.unlock();
            }
            sp.unlock();
        }
    }

    /// Message loop of thread 0: receives tasks, wakes the workers, runs
    /// the root search and reports the result.
    fn main_thread_loop(self: Arc<Self>, receiver: Arc<Mutex<Receiver<Message>>>) {
        loop {
            if self.exit.load(Ordering::Acquire) {
                break;
            }

            let message = {
                let guard = receiver.lock().unwrap();
                guard.recv()
            };

            match message {
                Ok(Message::StartThinking(task, thread, result_sender)) => {
                    thread.searching.store(true, Ordering::Release);

                    if let Some(pool) = task.pool.upgrade() {
                        pool.notify_all();
                    }

                    let result = search_root(task, &thread);

                    thread.searching.store(false, Ordering::Release);
                    self.thinking.store(false, Ordering::Release);

                    let _ = result_sender.send(result);
                }
                Ok(Message::Exit) | Err(_) => {
                    self.exit.store(true, Ordering::Release);
                    break;
                }
            }
        }
    }
}

enum Message {
    StartThinking(SearchTask, Arc<Thread>, Sender<SearchResult>),
    Exit,
}

/// Fixed-size pool of long-lived search threads plus an optional timer.
pub struct ThreadPool {
    threads: Vec<Arc<Thread>>,
    thread_handles: Mutex<Vec<JoinHandle<()>>>,
    pub size: usize,
    thinking: Arc<AtomicBool>,
    sender: Sender<Message>,
    abort_flag: Arc<AtomicBool>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    timer_stop: Arc<AtomicBool>,
}

impl ThreadPool {
    /// Creates the pool and starts its threads.
    pub fn new(n_threads: usize) -> Arc<ThreadPool> {
        let (sender, receiver) = std::sync::mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let pool = Arc::new_cyclic(|weak: &Weak<ThreadPool>| {
            let thinking = Arc::new(AtomicBool::new(false));
            let threads: Vec<Arc<Thread>> = (0..n_threads)
                .map(|i| Arc::new(Thread::new(i, thinking.clone(), weak.clone())))
                .collect();

            ThreadPool {
                threads,
                thread_handles: Mutex::new(Vec::new()),
                size: n_threads,
                thinking,
                sender,
                abort_flag: Arc::new(AtomicBool::new(false)),
                timer_handle: Mutex::new(None),
                timer_stop: Arc::new(AtomicBool::new(false)),
            }
        });

        let mut handles = Vec::with_capacity(n_threads);
        for (i, thread) in pool.threads.iter().enumerate() {
            let thread = thread.clone();
            let handle = if i == 0 {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name("search-main".into())
                    .spawn(move || thread.main_thread_loop(receiver))
            } else {
                std::thread::Builder::new()
                    .name(format!("search-worker-{i}"))
                    .spawn(move || thread.idle_loop())
            }
            .expect("failed to spawn search thread");
            handles.push(handle);
        }
        *pool.thread_handles.lock().unwrap() = handles;

        pool.main().ready.store(true, Ordering::Release);
        while !pool.threads.iter().all(|t| t.ready.load(Ordering::Relaxed)) {
            std::thread::sleep(Duration::from_millis(1));
        }

        pool
    }

    pub fn main(&self) -> &Arc<Thread> {
        &self.threads[0]
    }

    fn notify_all(&self) {
        for thread in &self.threads {
            thread.notify_one();
        }
    }

    /// Attaches idle threads to a freshly created split point.
    fn assign_workers(&self, sp: &Arc<SplitPoint>) {
        let sp_state = sp.state_mut();
        while sp_state.workers_mask.count() < MAX_WORKERS_PER_SPLITPOINT {
            let Some(worker) = self.threads.iter().find(|t| t.can_join(sp)).cloned() else {
                break;
            };
            worker.lock();
            if worker.can_join(sp) {
                sp_state.workers_mask.set(worker.idx);
                worker.state_mut().active_split_point = Some(sp.clone());
                worker.searching.store(true, Ordering::Release);
            }
            worker.unlock();
        }
    }

    /// Queues a search and returns the channel its result will arrive on.
    pub fn start_thinking(self: &Arc<Self>, task: SearchTask) -> Receiver<SearchResult> {
        let (result_sender, result_receiver) = std::sync::mpsc::channel();

        self.reset_abort_flag();
        self.thinking.store(true, Ordering::Release);

        self.sender
            .send(Message::StartThinking(
                task,
                self.main().clone(),
                result_sender,
            ))
            .expect("main search thread is gone");

        result_receiver
    }

    /// Blocks until the current search is over.
    pub fn wait_for_think_finished(&self) {
        while self.thinking.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking.load(Ordering::Acquire)
    }

    /// Raises the cooperative stop flag; workers observe it at node entry.
    pub fn abort_search(&self) {
        self.abort_flag.store(true, Ordering::Release);
    }

    fn reset_abort_flag(&self) {
        self.abort_flag.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.abort_flag.load(Ordering::Acquire)
    }

    pub fn get_abort_flag(&self) -> Arc<AtomicBool> {
        self.abort_flag.clone()
    }

    /// Arms a timer that raises the abort flag at the deadline.
    pub fn start_timer(&self, time_manager: Arc<TimeManager>) {
        self.timer_stop.store(false, Ordering::Release);

        let abort_flag = self.abort_flag.clone();
        let stop_flag = self.timer_stop.clone();

        let handle = std::thread::Builder::new()
            .name("search-timer".into())
            .spawn(move || {
                Self::timer_loop(&time_manager, &abort_flag, &stop_flag);
            })
            .expect("failed to spawn timer thread");

        *self.timer_handle.lock().unwrap() = Some(handle);
    }

    fn timer_loop(time_manager: &TimeManager, abort_flag: &AtomicBool, stop_flag: &AtomicBool) {
        loop {
            if stop_flag.load(Ordering::Acquire) {
                return;
            }

            match time_manager.deadline() {
                Some(deadline) if Instant::now() >= deadline => {
                    abort_flag.store(true, Ordering::Release);
                    return;
                }
                Some(_) => {}
                None => return,
            }

            std::thread::sleep(TIMER_INTERVAL);
        }
    }

    /// Stops and joins the timer thread, if one is running.
    pub fn stop_timer(&self) {
        self.timer_stop.store(true, Ordering::Release);
        if let Some(handle) = self.timer_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn exit(&self) {
        self.stop_timer();
        self.abort_search();

        for thread in &self.threads {
            let _guard = thread.sleep_mutex.lock();
            thread.exit.store(true, Ordering::Release);
        }
        for thread in &self.threads {
            thread.notify_one();
        }

        let _ = self.sender.send(Message::Exit);

        for handle in self.thread_handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.exit();
    }
}
