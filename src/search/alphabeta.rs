//! Principal variation search, run by every pool thread.
//!
//! The move loop of a node is written once, in [`Worker::search_move`], and
//! driven either by the serial loop in [`Worker::search`] or, once the node
//! has been shared, by [`Worker::search_split_point`]. A split point searched
//! by its master alone therefore visits the same moves in the same order as
//! the serial search would.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use cozy_chess::{Color, Move};

use crate::board::Position;
use crate::search::eval::{evaluate, piece_value, DRAW_SCORE, KNOWN_WIN, MATE_SCORE};
use crate::search::movepick::MovePicker;
use crate::search::see::{see, see_sign};
use crate::search::tt::{Bound, Entry};
use crate::search::{
    mate_in, mated_in, sort_root_moves, value_from_tt, value_to_tt, Depth, Limits, NodeType, RootMove, SearchInfo,
    SearchResult, Value, INFINITE, MATED_IN_MAX_PLY, MATE_IN_MAX_PLY, MAX_PLY, VALUE_NONE,
};
use crate::threads::{lock, read, NodeCtx, SpState, SplitPoint, Worker};

const ASPIRATION_DELTA: Value = 16;
const DEPTH_NONE: Depth = -6;
const MAX_QUIETS: usize = 64;

/// Outcome of trying one move at a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MoveResult {
    Pruned,
    /// Skipped, but the node's best value must be raised to at least this.
    Futile(Value),
    Searched { value: Value, quiet: bool },
}

struct Tables {
    // [pv][depth][move count]
    reductions: [[[u8; 64]; 64]; 2],
    // [improving][depth]
    move_counts: [[u32; 16]; 2],
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut t = Tables { reductions: [[[0; 64]; 64]; 2], move_counts: [[0; 16]; 2] };
        for d in 1..64 {
            for mc in 1..64 {
                let l = (d as f64).ln() * (mc as f64).ln();
                let pv = l / 3.0;
                let non_pv = 0.33 + l / 2.25;
                t.reductions[1][d][mc] = if pv >= 1.0 { pv.floor() as u8 } else { 0 };
                t.reductions[0][d][mc] = if non_pv >= 1.0 { non_pv.floor() as u8 } else { 0 };
            }
        }
        for d in 0..16 {
            let df = d as f64;
            t.move_counts[0][d] = (2.4 + 0.222 * df.powf(1.8)) as u32;
            t.move_counts[1][d] = (3.0 + 0.3 * (df + 0.98).powf(1.8)) as u32;
        }
        t
    })
}

pub(crate) fn reduction(pv: bool, improving: bool, depth: Depth, move_count: u32) -> Depth {
    let d = depth.clamp(0, 63) as usize;
    let mc = (move_count as usize).min(63);
    let mut r = Depth::from(tables().reductions[usize::from(pv)][d][mc]);
    if !pv && !improving && r >= 2 {
        r += 1;
    }
    r
}

/// Quiet moves tried beyond this count are pruned at shallow non-PV nodes.
pub(crate) fn move_count_limit(improving: bool, depth: Depth) -> u32 {
    tables().move_counts[usize::from(improving)][depth.clamp(0, 15) as usize]
}

fn futility_margin(depth: Depth) -> Value { 200 * depth.max(0) }

fn tt_cutoff(e: &Entry, value: Value, beta: Value) -> bool {
    value != VALUE_NONE
        && match e.bound {
            Bound::Exact => true,
            Bound::Lower => value >= beta,
            Bound::Upper => value < beta,
        }
}

impl Worker {
    /// Alpha-beta search of `pos` to `depth`. Returns a score from the side to
    /// move's point of view, or 0 once the search is stopped or a split point
    /// above has been cut off.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn search(
        &mut self,
        pos: &mut Position,
        mut alpha: Value,
        mut beta: Value,
        depth: Depth,
        ply: usize,
        nt: NodeType,
        cut_node: bool,
    ) -> Value {
        let pv_node = nt != NodeType::NonPv;
        let root = nt == NodeType::Root;
        debug_assert!(-INFINITE <= alpha && alpha < beta && beta <= INFINITE);
        debug_assert!(pv_node || alpha == beta - 1);

        if depth < 1 {
            return self.qsearch(pos, alpha, beta, 0, ply, pv_node);
        }
        self.poll_limits();
        let in_check = pos.in_check();
        if pv_node && ply > self.sel_depth {
            self.sel_depth = ply;
        }

        if !root {
            if self.shared.signals.stopped() || pos.is_draw() || ply >= MAX_PLY {
                return if ply >= MAX_PLY && !in_check { evaluate(pos) } else { DRAW_SCORE };
            }
            // Mate distance pruning
            alpha = alpha.max(mated_in(ply));
            beta = beta.min(mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        let key = pos.key();
        let tte = self.tt.probe(key);
        let tt_value = tte.map_or(VALUE_NONE, |e| value_from_tt(e.score, ply));
        let mut tt_move = if root {
            self.root_order.first().copied()
        } else {
            tte.and_then(|e| e.mv).filter(|&m| pos.is_legal(m))
        };

        if !pv_node {
            if let Some(e) = tte.filter(|e| e.depth >= depth && tt_cutoff(e, tt_value, beta)) {
                if tt_value >= beta && !in_check {
                    if let Some(m) = e.mv.filter(|&m| pos.is_legal(m) && !pos.is_capture_or_promotion(m)) {
                        self.update_killers(ply, m);
                    }
                }
                return tt_value;
            }
        }

        let us = pos.side_to_move();
        let (static_eval, eval) = if in_check {
            (VALUE_NONE, VALUE_NONE)
        } else {
            let se = evaluate(pos);
            let refined = match tte {
                Some(e)
                    if tt_value != VALUE_NONE
                        && ((e.bound == Bound::Lower && tt_value > se) || (e.bound == Bound::Upper && tt_value < se)) =>
                {
                    tt_value
                }
                _ => se,
            };
            (se, refined)
        };
        let prev_eval = if ply >= 1 { self.evals[ply - 1] } else { VALUE_NONE };
        let improving = ply < 2
            || static_eval == VALUE_NONE
            || self.evals[ply - 2] == VALUE_NONE
            || static_eval >= self.evals[ply - 2];
        self.evals[ply] = static_eval;
        self.killers[ply + 2] = [None, None];

        if !pv_node && !in_check {
            // Reverse futility
            if depth < 7
                && eval - futility_margin(depth) >= beta
                && eval.abs() < KNOWN_WIN
                && pos.non_pawn_material(us)
            {
                return eval - futility_margin(depth);
            }

            // Null move, verified at high depth
            if depth >= 2
                && !self.skip_null[ply]
                && eval >= beta
                && pos.plies_from_null() > 0
                && pos.non_pawn_material(us)
                && pos.do_null_move()
            {
                let r = 3 + depth / 4;
                let null_value = -self.search(pos, -beta, -beta + 1, depth - r, ply + 1, NodeType::NonPv, !cut_node);
                pos.undo_null_move();
                if null_value >= beta {
                    let null_value = if null_value >= MATE_IN_MAX_PLY { beta } else { null_value };
                    if depth < 12 {
                        return null_value;
                    }
                    self.skip_null[ply] = true;
                    let v = self.search(pos, beta - 1, beta, depth - r, ply, NodeType::NonPv, false);
                    self.skip_null[ply] = false;
                    if v >= beta {
                        return null_value;
                    }
                }
            }
        }

        // Internal iterative deepening
        let iid_depth = if pv_node { 5 } else { 8 };
        if depth >= iid_depth && tt_move.is_none() && (pv_node || (!in_check && static_eval + 256 >= beta)) {
            let d = depth - 2 - if pv_node { 0 } else { depth / 4 };
            self.skip_null[ply] = true;
            self.search(pos, alpha, beta, d, ply, nt, true);
            self.skip_null[ply] = false;
            tt_move = self.tt.probe(key).and_then(|e| e.mv).filter(|&m| pos.is_legal(m));
            self.evals[ply] = static_eval;
        }

        let ctx = NodeCtx {
            depth,
            ply,
            node_type: nt,
            cut_node,
            in_check,
            static_eval,
            prev_eval,
            improving,
            beta,
            tt_move,
            killers: self.killers[ply],
        };
        let mut picker = Some(if root {
            MovePicker::from_list(self.root_order.clone())
        } else {
            MovePicker::new(pos, tt_move, ctx.killers)
        });
        let mut best_value = -INFINITE;
        let mut best_move = None;
        let mut move_count = 0u32;
        let mut quiets: Vec<Move> = Vec::with_capacity(MAX_QUIETS);

        while let Some(mv) = picker.as_mut().and_then(|p| p.next(&self.history)) {
            move_count += 1;
            let (value, quiet) = match self.search_move(pos, &ctx, mv, move_count, alpha, best_value, None) {
                MoveResult::Pruned => continue,
                MoveResult::Futile(v) => {
                    best_value = best_value.max(v);
                    continue;
                }
                MoveResult::Searched { value, quiet } => (value, quiet),
            };
            if quiet && quiets.len() < MAX_QUIETS {
                quiets.push(mv);
            }
            if self.shared.signals.stopped() || self.cutoff_occurred() {
                return DRAW_SCORE;
            }
            if root {
                self.update_root_move(pos, mv, value, alpha, move_count);
            }
            if value > best_value {
                best_value = value;
                if value > alpha {
                    best_move = Some(mv);
                    if pv_node && value < beta {
                        alpha = value;
                    } else {
                        break;
                    }
                }
            }

            if self.can_split(depth) {
                if let Some(p) = picker.take() {
                    self.split(pos, &ctx, alpha, &mut best_value, &mut best_move, move_count, p, &mut quiets);
                    if self.shared.signals.stopped() || self.cutoff_occurred() {
                        return DRAW_SCORE;
                    }
                }
            }
        }

        if move_count == 0 {
            return if in_check { mated_in(ply) } else { DRAW_SCORE };
        }

        if best_value >= beta && !in_check {
            if let Some(bm) = best_move.filter(|&m| !pos.is_capture_or_promotion(m)) {
                self.update_stats(ply, bm, depth, &quiets);
            }
        }

        let bound = if best_value >= beta {
            Bound::Lower
        } else if pv_node && best_move.is_some() {
            Bound::Exact
        } else {
            Bound::Upper
        };
        self.tt.store(key, depth, bound, value_to_tt(best_value, ply), best_move);
        best_value
    }

    /// Prunes, reduces and searches a single move of the node described by
    /// `ctx`. At a split point `shared_alpha` is re-read before every
    /// null-window search so other threads' improvements take effect at once.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn search_move(
        &mut self,
        pos: &mut Position,
        ctx: &NodeCtx,
        mv: Move,
        move_count: u32,
        mut alpha: Value,
        best_value: Value,
        shared_alpha: Option<&AtomicI32>,
    ) -> MoveResult {
        let pv_node = ctx.node_type != NodeType::NonPv;
        let root = ctx.node_type == NodeType::Root;
        let (depth, ply) = (ctx.depth, ctx.ply);

        if root {
            self.shared.signals.first_root_move.store(move_count == 1, Ordering::SeqCst);
        }

        let quiet = !pos.is_capture_or_promotion(mv);
        let gives_check = pos.gives_check(mv);
        let extension = Depth::from(gives_check && see_sign(pos.board(), mv) >= 0);
        let new_depth = depth - 1 + extension;

        if !pv_node && quiet && !ctx.in_check && !gives_check && best_value > MATED_IN_MAX_PLY {
            if depth < 16 && move_count >= move_count_limit(ctx.improving, depth) {
                return MoveResult::Pruned;
            }
            let predicted = new_depth - reduction(false, ctx.improving, depth, move_count);
            if predicted < 7 {
                let futility_value = ctx.static_eval + futility_margin(predicted) + 128;
                if futility_value <= alpha {
                    return MoveResult::Futile(futility_value);
                }
            }
            if predicted < 4 && see_sign(pos.board(), mv) < 0 {
                return MoveResult::Pruned;
            }
        }

        self.make_move(pos, mv);

        let mut value = -INFINITE;
        let mut full_depth = !pv_node || move_count > 1;
        let late_quiet = depth >= 3
            && quiet
            && move_count > 1
            && Some(mv) != ctx.tt_move
            && !ctx.killers.contains(&Some(mv));
        if late_quiet {
            let mut r = reduction(pv_node, ctx.improving, depth, move_count);
            if !pv_node && ctx.cut_node {
                r += 1;
            }
            let d = (new_depth - r).max(1);
            if let Some(sa) = shared_alpha {
                alpha = sa.load(Ordering::Relaxed);
            }
            value = -self.search(pos, -(alpha + 1), -alpha, d, ply + 1, NodeType::NonPv, true);
            full_depth = value > alpha && d != new_depth;
        }

        if full_depth {
            if let Some(sa) = shared_alpha {
                alpha = sa.load(Ordering::Relaxed);
            }
            value = -self.search(pos, -(alpha + 1), -alpha, new_depth, ply + 1, NodeType::NonPv, !ctx.cut_node);
        }

        if pv_node && (move_count == 1 || (value > alpha && (root || value < ctx.beta))) {
            value = -self.search(pos, -ctx.beta, -alpha, new_depth, ply + 1, NodeType::Pv, false);
        }

        pos.undo_move();
        MoveResult::Searched { value, quiet }
    }

    /// Move loop of a shared node. Entered and left with the split point
    /// locked; the lock is released while a move is searched.
    pub(crate) fn search_split_point<'a>(
        &mut self,
        pos: &mut Position,
        sp: &'a SplitPoint,
        mut st: MutexGuard<'a, SpState>,
    ) -> MutexGuard<'a, SpState> {
        let ctx = st.ctx;
        let root = ctx.node_type == NodeType::Root;
        loop {
            let Some(mv) = st.picker.as_mut().and_then(|p| p.next(&self.history)) else { break };
            st.move_count += 1;
            let move_count = st.move_count;
            let best_value = st.best_value;
            let alpha = sp.alpha.load(Ordering::SeqCst);
            drop(st);

            let result = self.search_move(pos, &ctx, mv, move_count, alpha, best_value, Some(&sp.alpha));

            st = sp.lock();
            match result {
                MoveResult::Pruned => {}
                MoveResult::Futile(v) => st.best_value = st.best_value.max(v),
                MoveResult::Searched { value, quiet } => {
                    if quiet && st.quiets.len() < MAX_QUIETS {
                        st.quiets.push(mv);
                    }
                    if self.shared.signals.stopped() || self.cutoff_occurred() {
                        break;
                    }
                    if root {
                        self.update_root_move(pos, mv, value, sp.alpha.load(Ordering::SeqCst), move_count);
                    }
                    if sp.offer(&mut st, mv, value) {
                        break;
                    }
                }
            }
        }
        st
    }

    fn update_root_move(&mut self, pos: &Position, mv: Move, value: Value, alpha: Value, move_count: u32) {
        if move_count == 1 || value > alpha {
            let mut rm = RootMove::new(mv);
            rm.extract_pv_from_tt(pos, &self.tt);
            let mut root_moves = lock(&self.shared.root_moves);
            if let Some(r) = root_moves.iter_mut().find(|r| r.mv() == mv) {
                r.score = value;
                r.pv = rm.pv;
            }
            if move_count > 1 {
                self.shared.best_move_changes.fetch_add(1, Ordering::Relaxed);
            }
        } else if let Some(r) = lock(&self.shared.root_moves).iter_mut().find(|r| r.mv() == mv) {
            // Only the first move and improvements carry exact scores.
            r.score = -INFINITE;
        }
    }

    fn update_killers(&mut self, ply: usize, mv: Move) {
        let k = &mut self.killers[ply];
        if k[0] != Some(mv) {
            k[1] = k[0];
            k[0] = Some(mv);
        }
    }

    fn update_stats(&mut self, ply: usize, mv: Move, depth: Depth, quiets: &[Move]) {
        self.update_killers(ply, mv);
        let bonus = depth * depth;
        self.history.update(mv, bonus);
        for &q in quiets.iter().filter(|&&q| q != mv) {
            self.history.update(q, -bonus);
        }
    }

    /// Quiescence search: captures and queen promotions, or all evasions
    /// when in check. `depth` is zero or negative.
    pub(crate) fn qsearch(
        &mut self,
        pos: &mut Position,
        mut alpha: Value,
        beta: Value,
        depth: Depth,
        ply: usize,
        pv_node: bool,
    ) -> Value {
        let in_check = pos.in_check();
        let old_alpha = alpha;
        if pv_node && ply > self.sel_depth {
            self.sel_depth = ply;
        }
        if pos.is_draw() || ply >= MAX_PLY {
            return if ply >= MAX_PLY && !in_check { evaluate(pos) } else { DRAW_SCORE };
        }

        let tt_depth = if in_check || depth >= 0 { 0 } else { -1 };
        let key = pos.key();
        let tte = self.tt.probe(key);
        let tt_move = tte.and_then(|e| e.mv).filter(|&m| pos.is_legal(m));
        let tt_value = tte.map_or(VALUE_NONE, |e| value_from_tt(e.score, ply));

        if !pv_node {
            if tte.is_some_and(|e| e.depth >= tt_depth && tt_cutoff(&e, tt_value, beta)) {
                return tt_value;
            }
        }

        let (mut best_value, futility_base) = if in_check {
            (-INFINITE, -INFINITE)
        } else {
            let mut stand_pat = evaluate(pos);
            if let Some(e) = tte {
                if tt_value != VALUE_NONE
                    && ((e.bound == Bound::Lower && tt_value > stand_pat)
                        || (e.bound == Bound::Upper && tt_value < stand_pat))
                {
                    stand_pat = tt_value;
                }
            }
            if stand_pat >= beta {
                if tte.is_none() {
                    self.tt.store(key, DEPTH_NONE, Bound::Lower, value_to_tt(stand_pat, ply), None);
                }
                return stand_pat;
            }
            if pv_node && stand_pat > alpha {
                alpha = stand_pat;
            }
            (stand_pat, stand_pat + 128)
        };

        let mut picker = MovePicker::qsearch(pos, tt_move);
        let mut best_move = None;
        while let Some(mv) = picker.next(&self.history) {
            let gives_check = pos.gives_check(mv);

            if !pv_node
                && !in_check
                && !gives_check
                && Some(mv) != tt_move
                && mv.promotion.is_none()
                && futility_base > -KNOWN_WIN
            {
                let futility_value = futility_base + pos.captured_piece(mv).map_or(0, piece_value);
                if futility_value < beta {
                    best_value = best_value.max(futility_value);
                    continue;
                }
                if futility_base < beta && see(pos.board(), mv) <= 0 {
                    best_value = best_value.max(futility_base);
                    continue;
                }
            }

            let evasion_prunable = in_check && best_value > MATED_IN_MAX_PLY && !pos.is_capture(mv);
            if !pv_node
                && (!in_check || evasion_prunable)
                && Some(mv) != tt_move
                && mv.promotion.is_none()
                && see_sign(pos.board(), mv) < 0
            {
                continue;
            }

            self.make_move(pos, mv);
            let value = -self.qsearch(pos, -beta, -alpha, depth - 1, ply + 1, pv_node);
            pos.undo_move();

            if value > best_value {
                best_value = value;
                if value > alpha {
                    if pv_node && value < beta {
                        alpha = value;
                        best_move = Some(mv);
                    } else {
                        self.tt.store(key, tt_depth, Bound::Lower, value_to_tt(value, ply), Some(mv));
                        return value;
                    }
                }
            }
        }

        if in_check && best_value == -INFINITE {
            return mated_in(ply);
        }
        let bound = if pv_node && best_value > old_alpha { Bound::Exact } else { Bound::Upper };
        self.tt.store(key, tt_depth, bound, value_to_tt(best_value, ply), best_move);
        best_value
    }

    /// Runs one search on the main thread and publishes its result.
    pub(crate) fn think(&mut self) {
        self.refresh();
        let (root, limits, start) = {
            let setup = read(&self.shared.setup);
            (setup.root.clone(), setup.limits.clone(), setup.start)
        };
        self.history.clear();
        self.killers.fill([None, None]);

        let us = root.side_to_move();
        let game_ply = 2 * u32::from(root.board().fullmove_number().saturating_sub(1)) + u32::from(us == Color::Black);
        lock(&self.shared.time).init(&limits, game_ply, us);

        let mut completed = 0;
        if lock(&self.shared.root_moves).is_empty() {
            let score = if root.in_check() { -MATE_SCORE } else { DRAW_SCORE };
            log::debug!("no legal moves at the root");
            self.emit_info(&SearchInfo {
                depth: 0,
                sel_depth: 0,
                score_cp: score,
                nodes: 0,
                nps: 0,
                hashfull: self.tt.hashfull(),
                elapsed: start.elapsed(),
                pv: Vec::new(),
            });
            *lock(&self.shared.result) = SearchResult { score_cp: score, elapsed: start.elapsed(), ..SearchResult::default() };
        } else {
            self.shared.timer.set_run(true);
            completed = self.id_loop(&root, &limits, start);
            self.shared.timer.set_run(false);
        }

        // While pondering or on an infinite search the move may not be sent
        // before the GUI says so.
        if !self.shared.signals.stopped() && (limits.infinite || self.shared.ponder.load(Ordering::SeqCst)) {
            self.shared.signals.stop_on_ponderhit.store(true, Ordering::SeqCst);
            let data = Arc::clone(&self.data);
            let mut g = lock(&data.sleep_lock);
            while !self.shared.signals.stopped() && (limits.infinite || self.shared.ponder.load(Ordering::SeqCst)) {
                g = data.sleep_cond.wait(g).unwrap_or_else(PoisonError::into_inner);
            }
        }

        let Some(best) = lock(&self.shared.root_moves).first().cloned() else { return };
        let score_cp = [best.score, best.prev_score].into_iter().find(|&s| s > -INFINITE).unwrap_or(DRAW_SCORE);
        let result = SearchResult {
            bestmove: Some(best.mv()),
            ponder: best.pv.get(1).copied(),
            score_cp,
            depth: completed,
            nodes: self.shared.total_nodes(),
            pv: best.pv,
            elapsed: start.elapsed(),
        };
        log::info!(
            "bestmove {} depth {} score {} nodes {} time {}ms",
            result.bestmove_uci(),
            result.depth,
            result.score_cp,
            result.nodes,
            result.elapsed.as_millis()
        );
        *lock(&self.shared.result) = result;
    }

    // Iterative deepening with aspiration windows. Returns the last depth
    // that finished without being stopped.
    fn id_loop(&mut self, root: &Position, limits: &Limits, start: Instant) -> Depth {
        let mut pos = root.clone();
        self.tt.new_generation();
        let max_depth = if limits.depth > 0 { limits.depth.min(MAX_PLY as Depth - 1) } else { MAX_PLY as Depth - 1 };
        let root_move_count = lock(&self.shared.root_moves).len();
        let shared = Arc::clone(&self.shared);
        let signals = &shared.signals;
        let mut best_move_changes = 0.0f64;
        let mut completed = 0;
        let mut depth = 0;

        while depth < max_depth && !signals.stopped() {
            depth += 1;
            self.sel_depth = 0;
            let prev = {
                let mut rms = lock(&self.shared.root_moves);
                for rm in rms.iter_mut() {
                    rm.prev_score = rm.score;
                }
                self.root_order = rms.iter().map(RootMove::mv).collect();
                rms.first().map_or(DRAW_SCORE, |rm| rm.prev_score)
            };

            let (mut alpha, mut beta, mut delta) = if depth >= 5 {
                ((prev - ASPIRATION_DELTA).max(-INFINITE), (prev + ASPIRATION_DELTA).min(INFINITE), ASPIRATION_DELTA)
            } else {
                (-INFINITE, INFINITE, INFINITE)
            };

            loop {
                let score = self.search(&mut pos, alpha, beta, depth, 0, NodeType::Root, false);
                {
                    let mut rms = lock(&self.shared.root_moves);
                    sort_root_moves(&mut rms);
                    self.root_order = rms.iter().map(RootMove::mv).collect();
                }
                if signals.stopped() {
                    break;
                }
                if score <= alpha {
                    beta = (alpha + beta) / 2;
                    alpha = (score - delta).max(-INFINITE);
                    signals.failed_low_at_root.store(true, Ordering::SeqCst);
                    signals.stop_on_ponderhit.store(false, Ordering::SeqCst);
                } else if score >= beta {
                    alpha = (alpha + beta) / 2;
                    beta = (score + delta).min(INFINITE);
                } else {
                    break;
                }
                log::trace!("aspiration re-search at depth {depth}: [{alpha}, {beta}]");
                delta += delta / 2;
            }

            if signals.stopped() {
                break;
            }
            completed = depth;

            let (score, pv) = {
                let rms = lock(&self.shared.root_moves);
                rms.first().map_or((DRAW_SCORE, Vec::new()), |rm| (rm.score, rm.pv.clone()))
            };
            let elapsed = start.elapsed();
            let nodes = self.shared.total_nodes();
            self.emit_info(&SearchInfo {
                depth,
                sel_depth: self.sel_depth,
                score_cp: score,
                nodes,
                nps: nodes * 1000 / (elapsed.as_millis() as u64).max(1),
                hashfull: self.tt.hashfull(),
                elapsed,
                pv,
            });

            if limits.mate > 0 && score >= MATE_IN_MAX_PLY && MATE_SCORE - score <= 2 * limits.mate as Value {
                signals.stop.store(true, Ordering::SeqCst);
            }

            best_move_changes = best_move_changes * 0.5
                + f64::from(self.shared.best_move_changes.swap(0, Ordering::Relaxed));
            if limits.use_time_management() && !signals.stopped() && !signals.stop_on_ponderhit.load(Ordering::SeqCst) {
                if depth > 4 && depth < 50 {
                    lock(&self.shared.time).pv_instability(best_move_changes);
                }
                let available = lock(&self.shared.time).available_time();
                if root_move_count == 1 || start.elapsed() > available {
                    if self.shared.ponder.load(Ordering::SeqCst) {
                        signals.stop_on_ponderhit.store(true, Ordering::SeqCst);
                    } else {
                        signals.stop.store(true, Ordering::SeqCst);
                    }
                }
            }
        }
        completed
    }

    fn emit_info(&self, info: &SearchInfo) {
        log::debug!("{info}");
        let handler = read(&self.shared.info).clone();
        if let Some(handler) = handler {
            handler(info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reductions_grow_with_depth_and_move_count() {
        assert_eq!(reduction(true, true, 1, 1), 0);
        assert!(reduction(false, true, 20, 30) >= reduction(false, true, 6, 30));
        assert!(reduction(false, true, 20, 30) >= reduction(false, true, 20, 4));
        assert!(reduction(false, true, 20, 30) > reduction(true, true, 20, 30));
    }

    #[test]
    fn not_improving_reduces_more() {
        let r = reduction(false, true, 20, 30);
        assert!(r >= 2);
        assert_eq!(reduction(false, false, 20, 30), r + 1);
    }

    #[test]
    fn improving_allows_more_quiets() {
        for d in 1..16 {
            assert!(move_count_limit(true, d) >= move_count_limit(false, d));
        }
        assert_eq!(move_count_limit(false, 1), 2);
    }
}
