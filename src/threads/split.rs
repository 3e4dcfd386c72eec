use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use cozy_chess::Move;

use super::{available_slave, lock, AtomicSpRef, SpRef, Worker, MAX_SPLITPOINTS_PER_THREAD};
use crate::board::Position;
use crate::search::movepick::MovePicker;
use crate::search::{Depth, NodeType, Value, VALUE_NONE};

/// Search context of a node, fixed once its move loop starts.
#[derive(Clone, Copy, Debug)]
pub(crate) struct NodeCtx {
    pub depth: Depth,
    pub ply: usize,
    pub node_type: NodeType,
    pub cut_node: bool,
    pub in_check: bool,
    pub static_eval: Value,
    pub prev_eval: Value,
    pub improving: bool,
    pub beta: Value,
    pub tt_move: Option<Move>,
    pub killers: [Option<Move>; 2],
}

impl Default for NodeCtx {
    fn default() -> Self {
        Self {
            depth: 0,
            ply: 0,
            node_type: NodeType::NonPv,
            cut_node: false,
            in_check: false,
            static_eval: VALUE_NONE,
            prev_eval: VALUE_NONE,
            improving: true,
            beta: 0,
            tt_move: None,
            killers: [None, None],
        }
    }
}

/// Fields guarded by the split point mutex.
#[derive(Default)]
pub(crate) struct SpState {
    pub ctx: NodeCtx,
    pub best_value: Value,
    pub best_move: Option<Move>,
    pub move_count: u32,
    pub picker: Option<MovePicker>,
    pub pos: Option<Position>,
    pub quiets: Vec<Move>,
    pub nodes: u64,
}

/// One node searched by several threads at once.
///
/// Lives in its master's fixed stack and is reused once the master returns
/// from `split`.
pub struct SplitPoint {
    pub(crate) state: Mutex<SpState>,
    // Raised under the state lock, read without it.
    pub(crate) alpha: AtomicI32,
    pub(crate) cutoff: AtomicBool,
    pub(crate) slaves_mask: AtomicU64,
    pub(crate) all_slaves_searching: AtomicBool,
    pub(crate) parent: AtomicSpRef,
    pub(crate) master: usize,
}

impl SplitPoint {
    pub(crate) fn new(master: usize) -> Self {
        Self {
            state: Mutex::new(SpState::default()),
            alpha: AtomicI32::new(0),
            cutoff: AtomicBool::new(false),
            slaves_mask: AtomicU64::new(0),
            all_slaves_searching: AtomicBool::new(false),
            parent: AtomicSpRef::none(),
            master,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SpState> { lock(&self.state) }

    pub fn has_slave(&self, idx: usize) -> bool { self.slaves_mask.load(Ordering::SeqCst) & (1u64 << idx) != 0 }

    pub fn slaves(&self) -> u64 { self.slaves_mask.load(Ordering::SeqCst) }

    pub fn cutoff(&self) -> bool { self.cutoff.load(Ordering::SeqCst) }

    pub fn master(&self) -> usize { self.master }

    /// Best value so far. Never decreases while the split point is live.
    pub fn best_value(&self) -> Value { self.lock().best_value }

    /// Offers a result for `mv`. Returns true when it causes a beta cutoff.
    pub(crate) fn offer(&self, st: &mut SpState, mv: Move, value: Value) -> bool {
        if value <= st.best_value {
            return false;
        }
        st.best_value = value;
        if value <= self.alpha.load(Ordering::SeqCst) {
            return false;
        }
        st.best_move = Some(mv);
        if st.ctx.node_type != NodeType::NonPv && value < st.ctx.beta {
            self.alpha.store(value, Ordering::SeqCst);
            false
        } else {
            self.cutoff.store(true, Ordering::SeqCst);
            true
        }
    }
}

impl Worker {
    /// Walks up from the active split point; any cutoff above means our
    /// result is no longer needed.
    pub(crate) fn cutoff_occurred(&self) -> bool {
        let mut cur = self.data.active_split_point.load();
        while let Some(r) = cur {
            let Some(sp) = self.split_point(r) else { return false };
            if sp.cutoff.load(Ordering::Relaxed) {
                return true;
            }
            cur = sp.parent.load();
        }
        false
    }

    pub(crate) fn split_point(&self, r: SpRef) -> Option<&SplitPoint> {
        self.threads.get(r.thread).map(|t| &t.split_points[r.slot])
    }

    /// Whether a node at `depth` may be shared right now.
    pub(crate) fn can_split(&self, depth: Depth) -> bool {
        if self.threads.len() < 2
            || depth < self.shared.min_split_depth()
            || self.data.split_points_size.load(Ordering::SeqCst) >= MAX_SPLITPOINTS_PER_THREAD
        {
            return false;
        }
        match self.data.active_split_point.load() {
            None => true,
            Some(r) => self.split_point(r).is_some_and(|sp| !sp.all_slaves_searching.load(Ordering::SeqCst)),
        }
    }

    /// Shares the rest of the move loop at this node with every available
    /// thread, then searches it too and waits for all of them.
    ///
    /// `quiets` moves into the split point and comes back extended. On return
    /// `best_value` and `best_move` hold the merged result and the node counts
    /// are folded into `pos`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn split(
        &mut self,
        pos: &mut Position,
        ctx: &NodeCtx,
        alpha: Value,
        best_value: &mut Value,
        best_move: &mut Option<Move>,
        move_count: u32,
        picker: MovePicker,
        quiets: &mut Vec<Move>,
    ) {
        debug_assert!(*best_value <= alpha && alpha < ctx.beta);
        debug_assert!(ctx.depth >= self.shared.min_split_depth());
        debug_assert!(self.data.searching.load(Ordering::SeqCst));

        let data = Arc::clone(&self.data);
        let slot = data.split_points_size.load(Ordering::SeqCst);
        debug_assert!(slot < MAX_SPLITPOINTS_PER_THREAD);
        let sp = &data.split_points[slot];
        let me = SpRef { thread: self.idx, slot };
        let fake = self.shared.fake_split.load(Ordering::Relaxed);

        {
            let _pool = lock(&self.shared.mutex);
            let mut st = sp.lock();
            *st = SpState {
                ctx: *ctx,
                best_value: *best_value,
                best_move: *best_move,
                move_count,
                picker: Some(picker),
                pos: Some(pos.split_copy()),
                quiets: std::mem::take(quiets),
                nodes: 0,
            };
            sp.alpha.store(alpha, Ordering::SeqCst);
            sp.cutoff.store(false, Ordering::SeqCst);
            sp.slaves_mask.store(1u64 << self.idx, Ordering::SeqCst);
            sp.parent.store(data.active_split_point.load());
            sp.all_slaves_searching.store(true, Ordering::SeqCst);

            data.split_points_size.store(slot + 1, Ordering::SeqCst);
            data.active_split_point.store(Some(me));
            data.active_position.store(false, Ordering::SeqCst);

            if !fake {
                while let Some(slave) = available_slave(&self.threads, self.idx) {
                    sp.slaves_mask.fetch_or(1u64 << slave.idx, Ordering::SeqCst);
                    slave.active_split_point.store(Some(me));
                    slave.searching.store(true, Ordering::SeqCst);
                    slave.notify();
                }
            }
            log::trace!("thread {} split at ply {} depth {} slaves {:#x}", self.idx, ctx.ply, ctx.depth, sp.slaves());
        }

        // Searching flag is still set, so this searches the split point first.
        self.idle_loop();

        debug_assert!(!data.searching.load(Ordering::SeqCst));
        debug_assert!(!data.active_position.load(Ordering::SeqCst));

        let _pool = lock(&self.shared.mutex);
        let mut st = sp.lock();
        data.searching.store(true, Ordering::SeqCst);
        data.split_points_size.store(slot, Ordering::SeqCst);
        data.active_split_point.store(sp.parent.load());
        data.active_position.store(true, Ordering::SeqCst);
        pos.set_nodes_searched(pos.nodes_searched() + st.nodes);
        *best_value = st.best_value;
        *best_move = st.best_move;
        *quiets = std::mem::take(&mut st.quiets);
        st.picker = None;
        st.pos = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::ThreadData;

    fn sp_with(node_type: NodeType, alpha: Value, beta: Value) -> (SplitPoint, SpState) {
        let sp = SplitPoint::new(0);
        sp.alpha.store(alpha, Ordering::SeqCst);
        let st = SpState {
            ctx: NodeCtx { node_type, beta, ..NodeCtx::default() },
            best_value: -30_001,
            ..SpState::default()
        };
        (sp, st)
    }

    #[test]
    fn best_value_only_improves() {
        let (sp, mut st) = sp_with(NodeType::Pv, 0, 100);
        let m: Move = "e2e4".parse().unwrap();
        let n: Move = "d2d4".parse().unwrap();
        assert!(!sp.offer(&mut st, m, 40));
        assert!(!sp.offer(&mut st, n, 10));
        assert_eq!(st.best_value, 40);
        assert_eq!(st.best_move, Some(m));
        assert_eq!(sp.alpha.load(Ordering::SeqCst), 40);
    }

    #[test]
    fn cutoff_is_sticky() {
        let (sp, mut st) = sp_with(NodeType::NonPv, 0, 1);
        let m: Move = "g1f3".parse().unwrap();
        assert!(sp.offer(&mut st, m, 5));
        assert!(sp.cutoff());
        assert!(!sp.offer(&mut st, m, 3));
        assert!(sp.cutoff());
    }

    #[test]
    fn helpful_master_rule() {
        let t = ThreadData::new(1);
        assert!(t.available_to(0));
        t.split_points_size.store(1, Ordering::SeqCst);
        t.split_points[0].slaves_mask.store(1 << 2, Ordering::SeqCst);
        assert!(!t.available_to(0));
        assert!(t.available_to(2));
        t.searching.store(true, Ordering::SeqCst);
        assert!(!t.available_to(2));
    }

    #[test]
    fn recruitment_takes_the_first_idle_thread() {
        let threads: Vec<Arc<ThreadData>> = (0..3).map(|i| Arc::new(ThreadData::new(i))).collect();
        threads[0].searching.store(true, Ordering::SeqCst);
        assert_eq!(available_slave(&threads, 0).map(|t| t.idx), Some(1));
        threads[1].searching.store(true, Ordering::SeqCst);
        assert_eq!(available_slave(&threads, 0).map(|t| t.idx), Some(2));
        // Busy with its own split point, which thread 0 is not helping.
        threads[2].split_points_size.store(1, Ordering::SeqCst);
        assert_eq!(available_slave(&threads, 0).map(|t| t.idx), None);
        threads[2].split_points[0].slaves_mask.store(1, Ordering::SeqCst);
        assert_eq!(available_slave(&threads, 0).map(|t| t.idx), Some(2));
    }
}
