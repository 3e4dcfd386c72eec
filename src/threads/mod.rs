//! Worker pool for the YBWC search.
//!
//! Every worker owns a fixed stack of split points. A thread that reaches a
//! node deep enough to share recruits idle threads as slaves; it then waits
//! in its own idle loop, helping wherever it may, until all of them are done.
//! The timer thread polices time and node limits.

mod split;
mod timer;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::board::Position;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::search::timeman::TimeManager;
use crate::search::tt::TranspositionTable;
use crate::search::{Depth, Limits, RootMove, SearchInfo, SearchResult, Signals};

pub use split::SplitPoint;
pub(crate) use split::{NodeCtx, SpState};
pub(crate) use worker::Worker;

/// Upper bound on pool size: slave sets are 64-bit masks.
pub const MAX_THREADS: usize = 64;
pub const MAX_SPLITPOINTS_PER_THREAD: usize = 8;

const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

pub type InfoHandler = Arc<dyn Fn(&SearchInfo) + Send + Sync>;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> { l.read().unwrap_or_else(PoisonError::into_inner) }

pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> { l.write().unwrap_or_else(PoisonError::into_inner) }

/// First thread, in index order, that may help `master` at a split point.
pub(crate) fn available_slave(threads: &[Arc<ThreadData>], master: usize) -> Option<&Arc<ThreadData>> {
    threads.iter().find(|t| t.available_to(master))
}

/// Names a split point by owner thread and stack slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpRef {
    pub thread: usize,
    pub slot: usize,
}

/// An `Option<SpRef>` packed into one atomic word.
#[derive(Debug)]
pub(crate) struct AtomicSpRef(AtomicUsize);

impl AtomicSpRef {
    const NONE: usize = usize::MAX;

    pub(crate) fn none() -> Self { Self(AtomicUsize::new(Self::NONE)) }

    pub(crate) fn load(&self) -> Option<SpRef> {
        match self.0.load(Ordering::SeqCst) {
            Self::NONE => None,
            v => Some(SpRef { thread: v / MAX_SPLITPOINTS_PER_THREAD, slot: v % MAX_SPLITPOINTS_PER_THREAD }),
        }
    }

    pub(crate) fn store(&self, r: Option<SpRef>) {
        let v = r.map_or(Self::NONE, |r| r.thread * MAX_SPLITPOINTS_PER_THREAD + r.slot);
        self.0.store(v, Ordering::SeqCst);
    }
}

/// State of one worker visible to the rest of the pool.
pub struct ThreadData {
    pub idx: usize,
    pub(crate) searching: AtomicBool,
    pub(crate) exit: AtomicBool,
    pub(crate) thinking: AtomicBool,
    pub(crate) split_points_size: AtomicUsize,
    pub(crate) active_split_point: AtomicSpRef,
    pub(crate) active_position: AtomicBool,
    pub(crate) split_points: [SplitPoint; MAX_SPLITPOINTS_PER_THREAD],
    pub(crate) nodes: AtomicU64,
    pub(crate) sleep_lock: Mutex<()>,
    pub(crate) sleep_cond: Condvar,
}

impl ThreadData {
    pub(crate) fn new(idx: usize) -> Self {
        Self {
            idx,
            searching: AtomicBool::new(false),
            exit: AtomicBool::new(false),
            thinking: AtomicBool::new(false),
            split_points_size: AtomicUsize::new(0),
            active_split_point: AtomicSpRef::none(),
            active_position: AtomicBool::new(false),
            split_points: std::array::from_fn(|_| SplitPoint::new(idx)),
            nodes: AtomicU64::new(0),
            sleep_lock: Mutex::new(()),
            sleep_cond: Condvar::new(),
        }
    }

    /// Wakes the thread if it is parked.
    pub(crate) fn notify(&self) {
        let _g = lock(&self.sleep_lock);
        self.sleep_cond.notify_one();
    }

    /// Whether this thread may help at a split point owned by `master`.
    ///
    /// It must be idle, and if it still has split points of its own, `master`
    /// must be working on the top one.
    pub fn available_to(&self, master: usize) -> bool {
        if self.searching.load(Ordering::SeqCst) {
            return false;
        }
        // Local copy: the size may drop under our feet.
        let size = self.split_points_size.load(Ordering::SeqCst);
        size == 0 || self.split_points[size - 1].has_slave(master)
    }

    pub fn nodes_searched(&self) -> u64 { self.nodes.load(Ordering::Relaxed) }

    pub fn is_searching(&self) -> bool { self.searching.load(Ordering::SeqCst) }

    pub fn split_points_in_use(&self) -> usize { self.split_points_size.load(Ordering::SeqCst) }
}

pub(crate) struct SearchSetup {
    pub(crate) root: Position,
    pub(crate) limits: Limits,
    pub(crate) start: Instant,
}

/// Everything the pool, the timer and the workers share.
pub(crate) struct Shared {
    pub(crate) threads: RwLock<Arc<[Arc<ThreadData>]>>,
    // Orders split point creation and slave recruitment.
    pub(crate) mutex: Mutex<()>,
    pub(crate) tt: RwLock<Arc<TranspositionTable>>,
    pub(crate) signals: Signals,
    pub(crate) setup: RwLock<SearchSetup>,
    pub(crate) root_moves: Mutex<Vec<RootMove>>,
    pub(crate) best_move_changes: AtomicU32,
    pub(crate) min_split_depth: AtomicI32,
    pub(crate) fake_split: AtomicBool,
    pub(crate) ponder: AtomicBool,
    pub(crate) time: Mutex<TimeManager>,
    pub(crate) result: Mutex<SearchResult>,
    pub(crate) think_cond: Condvar,
    pub(crate) timer: timer::TimerState,
    pub(crate) info: RwLock<Option<InfoHandler>>,
    pub(crate) live: AtomicUsize,
}

impl Shared {
    fn new(hash_mb: usize) -> Self {
        Self {
            threads: RwLock::new(Arc::from(Vec::new())),
            mutex: Mutex::new(()),
            tt: RwLock::new(Arc::new(TranspositionTable::new(hash_mb))),
            signals: Signals::default(),
            setup: RwLock::new(SearchSetup { root: Position::startpos(), limits: Limits::default(), start: Instant::now() }),
            root_moves: Mutex::new(Vec::new()),
            best_move_changes: AtomicU32::new(0),
            min_split_depth: AtomicI32::new(4),
            fake_split: AtomicBool::new(false),
            ponder: AtomicBool::new(false),
            time: Mutex::new(TimeManager::default()),
            result: Mutex::new(SearchResult::default()),
            think_cond: Condvar::new(),
            timer: timer::TimerState::default(),
            info: RwLock::new(None),
            live: AtomicUsize::new(0),
        }
    }

    pub(crate) fn threads(&self) -> Arc<[Arc<ThreadData>]> { Arc::clone(&read(&self.threads)) }

    pub(crate) fn main(&self) -> Option<Arc<ThreadData>> { read(&self.threads).first().cloned() }

    pub(crate) fn min_split_depth(&self) -> Depth { self.min_split_depth.load(Ordering::Relaxed) }

    pub(crate) fn total_nodes(&self) -> u64 { read(&self.threads).iter().map(|t| t.nodes_searched()).sum() }

    /// Raises the stop signal and wakes the main thread in case it waits for it.
    pub(crate) fn stop(&self) {
        self.signals.stop.store(true, Ordering::SeqCst);
        if let Some(main) = self.main() {
            main.notify();
        }
    }
}

/// Counts a live OS thread for as long as it is held.
pub(crate) struct LiveGuard(Arc<Shared>);

impl LiveGuard {
    pub(crate) fn new(shared: &Arc<Shared>) -> Self {
        shared.live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(shared))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) { self.0.live.fetch_sub(1, Ordering::SeqCst); }
}

/// The search threads plus the timer. Dropping the pool joins them all.
pub struct ThreadPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
    config: EngineConfig,
}

impl ThreadPool {
    /// Starts the timer and the main thread, then sizes the pool after `config`.
    pub fn init(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared::new(config.hash_mb));
        let mut pool = Self { shared, handles: Vec::new(), timer: None, config: config.clone() };
        pool.timer = Some(timer::spawn(&pool.shared)?);
        pool.spawn_worker()?;
        pool.apply_config(config)?;
        log::debug!("thread pool ready: {} threads, {} MB hash", pool.size(), config.hash_mb);
        Ok(pool)
    }

    /// Re-reads engine options: thread count, hash size and split parameters.
    pub fn apply_config(&mut self, config: &EngineConfig) -> Result<()> {
        config.validate()?;
        self.wait_for_think_finished();
        self.shared.min_split_depth.store(config.effective_min_split_depth(), Ordering::Relaxed);
        self.shared.fake_split.store(config.fake_split, Ordering::Relaxed);
        self.resize(config.threads)?;
        if config.hash_mb != self.config.hash_mb {
            self.set_hash_size_bytes(config.hash_mb * 1024 * 1024)?;
        }
        self.config = config.clone();
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn size(&self) -> usize { self.handles.len() }

    /// Grows by spawning parked workers or shrinks by joining the newest ones.
    pub fn resize(&mut self, requested: usize) -> Result<()> {
        if requested == 0 || requested > MAX_THREADS {
            return Err(EngineError::InvalidThreadCount(requested));
        }
        self.wait_for_think_finished();
        while self.handles.len() < requested {
            self.spawn_worker()?;
        }
        while self.handles.len() > requested {
            self.join_last_worker();
        }
        self.config.threads = requested;
        Ok(())
    }

    fn spawn_worker(&mut self) -> Result<()> {
        let idx = self.handles.len();
        let data = Arc::new(ThreadData::new(idx));
        {
            let mut threads = write(&self.shared.threads);
            let mut list: Vec<_> = threads.iter().cloned().collect();
            list.push(Arc::clone(&data));
            *threads = Arc::from(list);
        }
        let shared = Arc::clone(&self.shared);
        let live = LiveGuard::new(&shared);
        let spawned = std::thread::Builder::new()
            .name(format!("splitbot-worker-{idx}"))
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || {
                let _live = live;
                let mut worker = Worker::new(data, shared);
                if worker.idx == 0 {
                    worker.main_idle_loop();
                } else {
                    worker.idle_loop();
                }
            });
        match spawned {
            Ok(handle) => {
                self.handles.push(handle);
                log::trace!("spawned worker {idx}");
                Ok(())
            }
            Err(e) => {
                self.drop_last_thread_data();
                Err(EngineError::ThreadSpawn(e))
            }
        }
    }

    fn drop_last_thread_data(&self) {
        let mut threads = write(&self.shared.threads);
        let list: Vec<_> = threads.iter().take(threads.len().saturating_sub(1)).cloned().collect();
        *threads = Arc::from(list);
    }

    fn join_last_worker(&mut self) {
        let Some(handle) = self.handles.pop() else { return };
        if let Some(data) = read(&self.shared.threads).get(self.handles.len()).cloned() {
            data.exit.store(true, Ordering::SeqCst);
            data.notify();
        }
        if handle.join().is_err() {
            log::error!("worker {} panicked", self.handles.len());
        }
        self.drop_last_thread_data();
        log::trace!("joined worker {}", self.handles.len());
    }

    /// Stops any search and joins every thread, timer first. Idempotent.
    pub fn exit(&mut self) {
        if self.timer.is_none() && self.handles.is_empty() {
            return;
        }
        self.request_stop();
        self.wait_for_think_finished();
        if let Some(timer) = self.timer.take() {
            self.shared.timer.request_exit();
            if timer.join().is_err() {
                log::error!("timer thread panicked");
            }
        }
        while !self.handles.is_empty() {
            self.join_last_worker();
        }
        log::debug!("thread pool stopped");
    }

    /// Index of the first thread that may help `master` at a split point.
    pub fn available_slave(&self, master: usize) -> Option<usize> {
        available_slave(&self.shared.threads(), master).map(|t| t.idx)
    }

    /// Installs a new search and wakes the main thread. Returns immediately.
    pub fn start_thinking(&self, pos: &Position, limits: Limits) -> Result<()> {
        let main = self.shared.main().ok_or(EngineError::PoolNotRunning)?;
        self.wait_for_think_finished();
        let start = Instant::now();

        let signals = &self.shared.signals;
        signals.reset();
        self.shared.best_move_changes.store(0, Ordering::SeqCst);
        for th in self.shared.threads().iter() {
            th.nodes.store(0, Ordering::SeqCst);
        }

        let root_moves: Vec<RootMove> = pos
            .legal_moves()
            .into_iter()
            .filter(|m| limits.search_moves.is_empty() || limits.search_moves.contains(m))
            .map(RootMove::new)
            .collect();
        log::debug!("start thinking on {} with {} root moves", pos.fen(), root_moves.len());
        *lock(&self.shared.root_moves) = root_moves;
        *lock(&self.shared.result) = SearchResult::default();
        self.shared.ponder.store(limits.ponder, Ordering::SeqCst);

        let mut root = pos.clone();
        root.set_nodes_searched(0);
        *write(&self.shared.setup) = SearchSetup { root, limits, start };

        let _g = lock(&main.sleep_lock);
        main.thinking.store(true, Ordering::SeqCst);
        main.sleep_cond.notify_one();
        Ok(())
    }

    pub fn request_stop(&self) { self.shared.stop(); }

    /// The opponent played the expected move: leave ponder mode, or stop if
    /// the search already finished and only waits for this.
    pub fn ponderhit(&self) {
        self.shared.ponder.store(false, Ordering::SeqCst);
        if self.shared.signals.stop_on_ponderhit.load(Ordering::SeqCst) {
            self.shared.stop();
        }
    }

    /// Blocks until the main thread has gone back to sleep.
    pub fn wait_for_think_finished(&self) {
        let Some(main) = self.shared.main() else { return };
        let g = lock(&main.sleep_lock);
        let _g = self
            .shared
            .think_cond
            .wait_while(g, |_| main.thinking.load(Ordering::SeqCst))
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub fn is_thinking(&self) -> bool { self.shared.main().is_some_and(|m| m.thinking.load(Ordering::SeqCst)) }

    /// Runs a complete search and returns its result.
    pub fn search(&self, pos: &Position, limits: Limits) -> Result<SearchResult> {
        self.start_thinking(pos, limits)?;
        self.wait_for_think_finished();
        Ok(self.result())
    }

    /// Result of the last finished search.
    pub fn result(&self) -> SearchResult { lock(&self.shared.result).clone() }

    pub fn tt(&self) -> Arc<TranspositionTable> { Arc::clone(&read(&self.shared.tt)) }

    pub fn set_hash_size_bytes(&mut self, bytes: usize) -> Result<()> {
        self.wait_for_think_finished();
        let mut tt = TranspositionTable::with_entries(1);
        tt.configure(bytes)?;
        *write(&self.shared.tt) = Arc::new(tt);
        self.config.hash_mb = (bytes / (1024 * 1024)).max(1);
        Ok(())
    }

    pub fn clear_hash(&self) {
        self.wait_for_think_finished();
        self.tt().clear();
    }

    pub fn set_info_handler<F>(&self, handler: F)
    where
        F: Fn(&SearchInfo) + Send + Sync + 'static,
    {
        *write(&self.shared.info) = Some(Arc::new(handler));
    }

    /// OS threads currently alive: workers plus the timer.
    pub fn live_threads(&self) -> usize { self.shared.live.load(Ordering::SeqCst) }

    /// Sum of the per-thread node counters of the current or last search.
    pub fn total_nodes(&self) -> u64 { self.shared.total_nodes() }

    /// Per-thread view, mostly for diagnostics and tests.
    pub fn threads(&self) -> Arc<[Arc<ThreadData>]> { self.shared.threads() }
}

impl Drop for ThreadPool {
    fn drop(&mut self) { self.exit(); }
}
