//! Staged move ordering.
//!
//! Normal nodes: hash move, winning captures by MVV-LVA, killers, quiet moves
//! by history, then losing captures. Quiescence nodes only see tactical moves
//! unless in check. The root walks a fixed, pre-ordered list.

use cozy_chess::{Board, Move, Piece};

use crate::board::Position;
use crate::search::eval::piece_value;
use crate::search::see::see;

const HISTORY_MAX: i32 = 2000;

/// Butterfly history, indexed by from/to square.
#[derive(Clone)]
pub struct History {
    table: Box<[i32; 64 * 64]>,
}

impl Default for History {
    fn default() -> Self { Self { table: Box::new([0; 64 * 64]) } }
}

impl History {
    fn index(mv: Move) -> usize { mv.from as usize * 64 + mv.to as usize }

    pub fn get(&self, mv: Move) -> i32 { self.table[Self::index(mv)] }

    /// Adds `bonus` unless that would push the entry past the saturation bound.
    pub fn update(&mut self, mv: Move, bonus: i32) {
        let e = &mut self.table[Self::index(mv)];
        if (*e + bonus).abs() < HISTORY_MAX {
            *e += bonus;
        }
    }

    pub fn clear(&mut self) { self.table.fill(0); }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    TtMove,
    Captures,
    Killers,
    ScoreQuiets,
    Quiets,
    BadCaptures,
    List,
    Done,
}

#[derive(Clone, Copy, Debug)]
struct Scored {
    mv: Move,
    score: i32,
}

fn is_tactical(board: &Board, mv: Move) -> bool {
    if mv.promotion == Some(Piece::Queen) {
        return true;
    }
    let them = board.colors(!board.side_to_move());
    them.has(mv.to) || (board.piece_on(mv.from) == Some(Piece::Pawn) && mv.from.file() != mv.to.file())
}

fn mvv_lva(board: &Board, mv: Move) -> i32 {
    let victim = board.piece_on(mv.to).filter(|_| board.colors(!board.side_to_move()).has(mv.to));
    let victim = victim.map_or(piece_value(Piece::Pawn), piece_value);
    let attacker = board.piece_on(mv.from).map_or(0, |p| p as i32);
    let promo = mv.promotion.map_or(0, piece_value);
    victim * 8 + promo - attacker
}

fn sort_desc(moves: &mut [Scored]) { moves.sort_by(|a, b| b.score.cmp(&a.score)); }

#[derive(Clone)]
pub struct MovePicker {
    board: Board,
    stage: Stage,
    tt_move: Option<Move>,
    killers: [Option<Move>; 2],
    captures: Vec<Scored>,
    quiets: Vec<Scored>,
    bad_captures: Vec<Move>,
    cur: usize,
    defer_bad: bool,
    skip_quiets: bool,
}

impl MovePicker {
    fn build(pos: &Position, tt_move: Option<Move>, killers: [Option<Move>; 2], keep_quiets: bool) -> Self {
        let board = pos.board().clone();
        let mut captures = Vec::with_capacity(16);
        let mut quiets = Vec::with_capacity(48);
        let mut tt_ok = false;
        for mv in pos.legal_moves() {
            if Some(mv) == tt_move {
                tt_ok = true;
                continue;
            }
            if is_tactical(&board, mv) {
                captures.push(Scored { mv, score: mvv_lva(&board, mv) });
            } else if keep_quiets {
                quiets.push(Scored { mv, score: 0 });
            }
        }
        sort_desc(&mut captures);
        Self {
            board,
            stage: Stage::TtMove,
            tt_move: tt_move.filter(|_| tt_ok),
            killers,
            captures,
            quiets,
            bad_captures: Vec::new(),
            cur: 0,
            defer_bad: true,
            skip_quiets: false,
        }
    }

    /// Picker for an interior node of the main search.
    pub fn new(pos: &Position, tt_move: Option<Move>, killers: [Option<Move>; 2]) -> Self {
        Self::build(pos, tt_move, killers, true)
    }

    /// Picker for quiescence: captures and queen promotions, or every evasion when in check.
    pub fn qsearch(pos: &Position, tt_move: Option<Move>) -> Self {
        let in_check = pos.in_check();
        let tt_move = tt_move.filter(|&m| in_check || is_tactical(pos.board(), m));
        let mut mp = Self::build(pos, tt_move, [None, None], in_check);
        mp.defer_bad = false;
        mp.skip_quiets = !in_check;
        mp
    }

    /// Walks `moves` in the given order.
    pub fn from_list(moves: Vec<Move>) -> Self {
        Self {
            board: Board::default(),
            stage: Stage::List,
            tt_move: None,
            killers: [None, None],
            captures: Vec::new(),
            quiets: moves.into_iter().map(|mv| Scored { mv, score: 0 }).collect(),
            bad_captures: Vec::new(),
            cur: 0,
            defer_bad: false,
            skip_quiets: false,
        }
    }

    pub fn next(&mut self, history: &History) -> Option<Move> {
        loop {
            match self.stage {
                Stage::TtMove => {
                    self.stage = Stage::Captures;
                    if self.tt_move.is_some() {
                        return self.tt_move;
                    }
                }
                Stage::Captures => {
                    if let Some(sm) = self.captures.get(self.cur).copied() {
                        self.cur += 1;
                        if self.defer_bad && see(&self.board, sm.mv) < 0 {
                            self.bad_captures.push(sm.mv);
                            continue;
                        }
                        return Some(sm.mv);
                    }
                    self.cur = 0;
                    self.stage = if self.skip_quiets { Stage::Done } else { Stage::Killers };
                }
                Stage::Killers => {
                    while self.cur < self.killers.len() {
                        let k = self.killers[self.cur];
                        self.cur += 1;
                        let Some(k) = k else { continue };
                        if let Some(i) = self.quiets.iter().position(|s| s.mv == k) {
                            self.quiets.remove(i);
                            return Some(k);
                        }
                    }
                    self.cur = 0;
                    self.stage = Stage::ScoreQuiets;
                }
                Stage::ScoreQuiets => {
                    for s in self.quiets.iter_mut() {
                        s.score = history.get(s.mv);
                    }
                    sort_desc(&mut self.quiets);
                    self.stage = Stage::Quiets;
                }
                Stage::Quiets | Stage::List => {
                    if let Some(sm) = self.quiets.get(self.cur) {
                        self.cur += 1;
                        return Some(sm.mv);
                    }
                    self.cur = 0;
                    self.stage = if self.stage == Stage::Quiets { Stage::BadCaptures } else { Stage::Done };
                }
                Stage::BadCaptures => {
                    if self.cur < self.bad_captures.len() {
                        self.cur += 1;
                        return Some(self.bad_captures[self.cur - 1]);
                    }
                    self.stage = Stage::Done;
                }
                Stage::Done => return None,
            }
        }
    }
}
