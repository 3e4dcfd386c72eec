use std::sync::atomic::Ordering;
use std::sync::{Arc, MutexGuard, PoisonError};

use cozy_chess::Move;

use super::split::SpState;
use super::{lock, read, Shared, SpRef, SplitPoint, ThreadData};
use crate::board::Position;
use crate::search::movepick::History;
use crate::search::tt::TranspositionTable;
use crate::search::{Value, MAX_PLY, VALUE_NONE};

// Stack arrays are indexed by ply and may be touched a couple of plies past MAX_PLY.
const STACK_SIZE: usize = MAX_PLY + 4;
const POLL_INTERVAL: u32 = 1024;

/// Thread-local search state of one pool thread.
pub(crate) struct Worker {
    pub(crate) idx: usize,
    pub(crate) data: Arc<ThreadData>,
    pub(crate) shared: Arc<Shared>,
    // Snapshots, refreshed whenever the thread wakes up. Neither changes
    // while a search is running.
    pub(crate) threads: Arc<[Arc<ThreadData>]>,
    pub(crate) tt: Arc<TranspositionTable>,
    pub(crate) history: History,
    pub(crate) killers: Vec<[Option<Move>; 2]>,
    pub(crate) evals: Vec<Value>,
    pub(crate) skip_null: Vec<bool>,
    pub(crate) root_order: Vec<Move>,
    pub(crate) sel_depth: usize,
    pub(crate) node_limit: u64,
    calls: u32,
}

impl Worker {
    pub(crate) fn new(data: Arc<ThreadData>, shared: Arc<Shared>) -> Self {
        let tt = Arc::clone(&read(&shared.tt));
        let mut w = Self {
            idx: data.idx,
            threads: shared.threads(),
            tt,
            data,
            shared,
            history: History::default(),
            killers: vec![[None, None]; STACK_SIZE],
            evals: vec![VALUE_NONE; STACK_SIZE],
            skip_null: vec![false; STACK_SIZE],
            root_order: Vec::new(),
            sel_depth: 0,
            node_limit: 0,
            calls: 0,
        };
        w.refresh();
        w
    }

    pub(crate) fn refresh(&mut self) {
        self.threads = self.shared.threads();
        self.tt = Arc::clone(&read(&self.shared.tt));
        self.node_limit = read(&self.shared.setup).limits.nodes;
    }

    /// Plays `mv` and counts the node for this thread.
    pub(crate) fn make_move(&mut self, pos: &mut Position, mv: Move) {
        pos.do_move(mv);
        self.data.nodes.fetch_add(1, Ordering::Relaxed);
    }

    /// Enforces the node limit between timer ticks.
    pub(crate) fn poll_limits(&mut self) {
        self.calls += 1;
        if self.calls < POLL_INTERVAL {
            return;
        }
        self.calls = 0;
        if self.node_limit > 0 {
            let total: u64 = self.threads.iter().map(|t| t.nodes_searched()).sum();
            if total >= self.node_limit {
                self.shared.signals.stop.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Parks the thread until it is handed a split point, searches it, and
    /// tries to join another one afterwards.
    ///
    /// When entered from `split` the thread is the master of its top split
    /// point and returns as soon as all slaves there have finished.
    pub(crate) fn idle_loop(&mut self) {
        let data = Arc::clone(&self.data);
        let size = data.split_points_size.load(Ordering::SeqCst);
        let this_sp = (size > 0).then(|| &data.split_points[size - 1]);
        debug_assert!(this_sp.map_or(true, |sp| sp.master == self.idx && data.searching.load(Ordering::SeqCst)));

        while !data.exit.load(Ordering::SeqCst) {
            while data.searching.load(Ordering::SeqCst) {
                if this_sp.is_none() {
                    self.refresh();
                }
                let sp_ref = {
                    let _pool = lock(&self.shared.mutex);
                    data.active_split_point.load()
                };
                let Some(sp_ref) = sp_ref else {
                    debug_assert!(false, "searching without a split point");
                    data.searching.store(false, Ordering::SeqCst);
                    break;
                };
                self.search_assigned(sp_ref);
                self.try_late_join();
            }

            let g = lock(&data.sleep_lock);
            if this_sp.is_some_and(|sp| sp.slaves() == 0) {
                debug_assert!(!data.searching.load(Ordering::SeqCst));
                break;
            }
            if !data.searching.load(Ordering::SeqCst) && !data.exit.load(Ordering::SeqCst) {
                log::trace!("thread {} parked", self.idx);
                drop(data.sleep_cond.wait(g).unwrap_or_else(PoisonError::into_inner));
            }
        }
    }

    fn search_assigned(&mut self, sp_ref: SpRef) {
        let Some(owner) = self.threads.get(sp_ref.thread).cloned() else {
            debug_assert!(false, "split point of an unknown thread");
            self.data.searching.store(false, Ordering::SeqCst);
            return;
        };
        let sp = &owner.split_points[sp_ref.slot];
        let st = sp.lock();
        let Some(mut pos) = st.pos.as_ref().map(Position::split_copy) else {
            debug_assert!(false, "split point without a position");
            self.leave(sp, sp_ref, st, 0);
            return;
        };
        let ctx = st.ctx;
        if ctx.ply >= 1 {
            self.evals[ctx.ply - 1] = ctx.prev_eval;
        }
        self.evals[ctx.ply] = ctx.static_eval;
        debug_assert!(!self.data.active_position.load(Ordering::SeqCst));
        self.data.active_position.store(true, Ordering::SeqCst);

        let st = self.search_split_point(&mut pos, sp, st);
        self.leave(sp, sp_ref, st, pos.nodes_searched());
    }

    // Bookkeeping after finishing at a split point. Once the lock is
    // released the split point may be reused by its master.
    fn leave(&mut self, sp: &SplitPoint, sp_ref: SpRef, mut st: MutexGuard<'_, SpState>, nodes: u64) {
        self.data.searching.store(false, Ordering::SeqCst);
        self.data.active_position.store(false, Ordering::SeqCst);
        sp.slaves_mask.fetch_and(!(1u64 << self.idx), Ordering::SeqCst);
        sp.all_slaves_searching.store(false, Ordering::SeqCst);
        st.nodes += nodes;
        // The last slave out wakes the master.
        if sp_ref.thread != self.idx && sp.slaves() == 0 {
            if let Some(master) = self.threads.get(sp_ref.thread) {
                master.notify();
            }
        }
    }

    /// A single attempt to help at another thread's top split point while
    /// none of its slaves has finished yet.
    fn try_late_join(&mut self) {
        if self.threads.len() <= 2 {
            return;
        }
        let data = Arc::clone(&self.data);
        for th in self.threads.iter() {
            let size = th.split_points_size.load(Ordering::SeqCst);
            if size == 0 {
                continue;
            }
            let sp = &th.split_points[size - 1];
            if sp.all_slaves_searching.load(Ordering::SeqCst) && data.available_to(th.idx) {
                let _pool = lock(&self.shared.mutex);
                let _st = sp.lock();
                // Recheck under lock.
                if sp.all_slaves_searching.load(Ordering::SeqCst) && data.available_to(th.idx) {
                    sp.slaves_mask.fetch_or(1u64 << self.idx, Ordering::SeqCst);
                    data.active_split_point.store(Some(SpRef { thread: th.idx, slot: size - 1 }));
                    data.searching.store(true, Ordering::SeqCst);
                    log::trace!("thread {} late joins thread {} slot {}", self.idx, th.idx, size - 1);
                }
                break;
            }
        }
    }

    /// Idle loop of thread 0: sleeps until a search is started, runs it, and
    /// signals completion.
    pub(crate) fn main_idle_loop(&mut self) {
        let data = Arc::clone(&self.data);
        loop {
            {
                let mut g = lock(&data.sleep_lock);
                while !data.thinking.load(Ordering::SeqCst) && !data.exit.load(Ordering::SeqCst) {
                    g = data.sleep_cond.wait(g).unwrap_or_else(PoisonError::into_inner);
                }
            }
            if data.exit.load(Ordering::SeqCst) {
                let _g = lock(&data.sleep_lock);
                data.thinking.store(false, Ordering::SeqCst);
                self.shared.think_cond.notify_all();
                return;
            }

            data.searching.store(true, Ordering::SeqCst);
            self.think();
            data.searching.store(false, Ordering::SeqCst);

            let _g = lock(&data.sleep_lock);
            data.thinking.store(false, Ordering::SeqCst);
            self.shared.think_cond.notify_all();
        }
    }
}
