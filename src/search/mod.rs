pub mod alphabeta;
pub mod endgame;
pub mod eval;
pub mod movepick;
pub mod see;
pub mod timeman;
pub mod tt;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cozy_chess::Move;

use crate::board::Position;
use crate::search::eval::MATE_SCORE;
use crate::search::tt::TranspositionTable;

pub type Value = i32;
pub type Depth = i32;

pub const MAX_PLY: usize = 128;
pub const INFINITE: Value = MATE_SCORE + 1;
pub const VALUE_NONE: Value = MATE_SCORE + 2;
pub const MATE_IN_MAX_PLY: Value = MATE_SCORE - MAX_PLY as Value;
pub const MATED_IN_MAX_PLY: Value = -MATE_SCORE + MAX_PLY as Value;

pub fn mate_in(ply: usize) -> Value { MATE_SCORE - ply as Value }

pub fn mated_in(ply: usize) -> Value { -MATE_SCORE + ply as Value }

/// Mate scores are stored relative to the node, not the root.
pub fn value_to_tt(v: Value, ply: usize) -> Value {
    if v >= MATE_IN_MAX_PLY { v + ply as Value } else if v <= MATED_IN_MAX_PLY { v - ply as Value } else { v }
}

pub fn value_from_tt(v: Value, ply: usize) -> Value {
    if v >= MATE_IN_MAX_PLY { v - ply as Value } else if v <= MATED_IN_MAX_PLY { v + ply as Value } else { v }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Root,
    Pv,
    NonPv,
}

/// Search limits. Zero / `None` means "not set".
#[derive(Clone, Debug, Default)]
pub struct Limits {
    pub search_moves: Vec<Move>,
    pub wtime: Option<Duration>,
    pub btime: Option<Duration>,
    pub winc: Duration,
    pub binc: Duration,
    pub moves_to_go: u32,
    pub depth: Depth,
    pub nodes: u64,
    pub movetime: Option<Duration>,
    pub mate: u32,
    pub infinite: bool,
    pub ponder: bool,
}

impl Limits {
    pub fn depth(depth: Depth) -> Self { Self { depth, ..Self::default() } }

    pub fn movetime(t: Duration) -> Self { Self { movetime: Some(t), ..Self::default() } }

    pub fn nodes(nodes: u64) -> Self { Self { nodes, ..Self::default() } }

    pub fn infinite() -> Self { Self { infinite: true, ..Self::default() } }

    pub fn use_time_management(&self) -> bool {
        self.mate == 0 && self.movetime.is_none() && self.depth == 0 && self.nodes == 0 && !self.infinite
            && (self.wtime.is_some() || self.btime.is_some())
    }
}

/// Flags shared by every thread of a search.
#[derive(Debug, Default)]
pub struct Signals {
    pub stop: AtomicBool,
    pub stop_on_ponderhit: AtomicBool,
    pub first_root_move: AtomicBool,
    pub failed_low_at_root: AtomicBool,
}

impl Signals {
    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
        self.stop_on_ponderhit.store(false, Ordering::SeqCst);
        self.first_root_move.store(false, Ordering::SeqCst);
        self.failed_low_at_root.store(false, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool { self.stop.load(Ordering::Relaxed) }
}

#[derive(Clone, Debug)]
pub struct RootMove {
    pub score: Value,
    pub prev_score: Value,
    pub pv: Vec<Move>,
}

impl RootMove {
    pub fn new(mv: Move) -> Self { Self { score: -INFINITE, prev_score: -INFINITE, pv: vec![mv] } }

    pub fn mv(&self) -> Move { self.pv[0] }

    /// Rebuilds the PV by following hash moves from the root. Every move is
    /// checked for legality before it is played, so a colliding entry just
    /// ends the line.
    pub fn extract_pv_from_tt(&mut self, root: &Position, tt: &TranspositionTable) {
        let mut pos = root.clone();
        self.pv.truncate(1);
        pos.do_move(self.pv[0]);
        while self.pv.len() < MAX_PLY {
            let Some(mv) = tt.probe(pos.key()).and_then(|e| e.mv) else { break };
            if !pos.is_legal(mv) || (pos.is_draw() && self.pv.len() > 2) { break; }
            self.pv.push(mv);
            pos.do_move(mv);
        }
    }
}

/// Stable sort, best score first.
pub fn sort_root_moves(moves: &mut [RootMove]) { moves.sort_by(|a, b| b.score.cmp(&a.score)); }

#[derive(Clone, Debug, Default)]
pub struct SearchResult {
    pub bestmove: Option<Move>,
    pub ponder: Option<Move>,
    pub score_cp: Value,
    pub depth: Depth,
    pub nodes: u64,
    pub pv: Vec<Move>,
    pub elapsed: Duration,
}

impl SearchResult {
    pub fn bestmove_uci(&self) -> String {
        self.bestmove.map(|m| format!("{m}")).unwrap_or_else(|| "0000".to_string())
    }

    pub fn is_mate(&self) -> bool { self.score_cp.abs() >= MATE_IN_MAX_PLY }
}

/// One completed iteration, as handed to an info handler.
#[derive(Clone, Debug)]
pub struct SearchInfo {
    pub depth: Depth,
    pub sel_depth: usize,
    pub score_cp: Value,
    pub nodes: u64,
    pub nps: u64,
    pub hashfull: usize,
    pub elapsed: Duration,
    pub pv: Vec<Move>,
}

impl std::fmt::Display for SearchInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let score = if self.score_cp >= MATE_IN_MAX_PLY {
            format!("mate {}", (MATE_SCORE - self.score_cp + 1) / 2)
        } else if self.score_cp <= MATED_IN_MAX_PLY {
            format!("mate -{}", (MATE_SCORE + self.score_cp) / 2)
        } else {
            format!("cp {}", self.score_cp)
        };
        write!(
            f,
            "info depth {} seldepth {} score {} nodes {} nps {} hashfull {} time {} pv",
            self.depth, self.sel_depth, score, self.nodes, self.nps, self.hashfull, self.elapsed.as_millis()
        )?;
        for m in &self.pv {
            write!(f, " {m}")?;
        }
        Ok(())
    }
}
