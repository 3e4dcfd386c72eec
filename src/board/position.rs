use cozy_chess::{Board as CozyBoard, Color, Move, Piece, Square};

use crate::error::{EngineError, Result};

pub type MoveList = Vec<Move>;

#[derive(Clone, Debug)]
struct StateInfo {
    board: CozyBoard,
    plies_from_null: usize,
}

/// A cozy-chess board with make/unmake, repetition history and a node counter.
///
/// Every search thread owns its own `Position`; split points hand out copies.
#[derive(Clone, Debug)]
pub struct Position {
    board: CozyBoard,
    states: Vec<StateInfo>,
    // Fingerprints of every position before the current one, game moves included.
    keys: Vec<u64>,
    plies_from_null: usize,
    nodes: u64,
}

impl Default for Position {
    fn default() -> Self { Self::startpos() }
}

impl Position {
    pub fn startpos() -> Self { Self::from_board(CozyBoard::default()) }

    pub fn from_board(board: CozyBoard) -> Self {
        Self { board, states: Vec::with_capacity(128), keys: Vec::with_capacity(256), plies_from_null: 0, nodes: 0 }
    }

    pub fn from_fen(fen: &str) -> Result<Self> {
        CozyBoard::from_fen(fen, false)
            .map(Self::from_board)
            .map_err(|e| EngineError::InvalidFen { fen: fen.to_string(), reason: format!("{e:?}") })
    }

    /// `startpos` or a FEN, followed by moves in coordinate notation.
    pub fn from_fen_and_moves<S: AsRef<str>>(fen: &str, moves: &[S]) -> Result<Self> {
        let mut pos = if fen == "startpos" { Self::startpos() } else { Self::from_fen(fen)? };
        for m in moves {
            let mv = pos.parse_move(m.as_ref())?;
            pos.do_move(mv);
        }
        pos.states.clear();
        pos.nodes = 0;
        Ok(pos)
    }

    pub fn board(&self) -> &CozyBoard { &self.board }

    pub fn key(&self) -> u64 { self.board.hash() }

    pub fn side_to_move(&self) -> Color { self.board.side_to_move() }

    pub fn in_check(&self) -> bool { !self.board.checkers().is_empty() }

    pub fn legal_moves(&self) -> MoveList {
        let mut moves = Vec::with_capacity(64);
        self.board.generate_moves(|ml| { moves.extend(ml); false });
        moves
    }

    pub fn has_legal_moves(&self) -> bool {
        let mut any = false;
        self.board.generate_moves(|_| { any = true; true });
        any
    }

    pub fn is_legal(&self, mv: Move) -> bool { self.board.is_legal(mv) }

    pub fn piece_on(&self, sq: Square) -> Option<Piece> { self.board.piece_on(sq) }

    /// Piece removed from the board by `mv`, if any. En passant yields a pawn.
    pub fn captured_piece(&self, mv: Move) -> Option<Piece> {
        let them = !self.board.side_to_move();
        if self.board.colors(them).has(mv.to) {
            return self.board.piece_on(mv.to);
        }
        if self.board.piece_on(mv.from) == Some(Piece::Pawn) && mv.from.file() != mv.to.file() {
            return Some(Piece::Pawn);
        }
        None
    }

    pub fn is_capture(&self, mv: Move) -> bool { self.captured_piece(mv).is_some() }

    pub fn is_capture_or_promotion(&self, mv: Move) -> bool { mv.promotion.is_some() || self.is_capture(mv) }

    pub fn gives_check(&self, mv: Move) -> bool {
        let mut next = self.board.clone();
        next.play_unchecked(mv);
        !next.checkers().is_empty()
    }

    pub fn non_pawn_material(&self, color: Color) -> bool {
        let bb = self.board.colors(color);
        let minors_majors = self.board.pieces(Piece::Knight) | self.board.pieces(Piece::Bishop)
            | self.board.pieces(Piece::Rook) | self.board.pieces(Piece::Queen);
        !(bb & minors_majors).is_empty()
    }

    pub fn do_move(&mut self, mv: Move) {
        self.keys.push(self.board.hash());
        self.states.push(StateInfo { board: self.board.clone(), plies_from_null: self.plies_from_null });
        self.board.play_unchecked(mv);
        self.plies_from_null += 1;
        self.nodes += 1;
    }

    pub fn undo_move(&mut self) {
        if let Some(st) = self.states.pop() {
            self.board = st.board;
            self.plies_from_null = st.plies_from_null;
            self.keys.pop();
        }
    }

    /// Passes the turn. Returns false (and leaves the position untouched) when in check.
    pub fn do_null_move(&mut self) -> bool {
        let Some(next) = self.board.null_move() else { return false };
        self.keys.push(self.board.hash());
        self.states.push(StateInfo { board: std::mem::replace(&mut self.board, next), plies_from_null: self.plies_from_null });
        self.plies_from_null = 0;
        true
    }

    pub fn undo_null_move(&mut self) { self.undo_move(); }

    /// Plies played since the last null move (or since the position was set up).
    pub fn plies_from_null(&self) -> usize { self.plies_from_null }

    fn is_repetition(&self) -> bool {
        let window = (self.board.halfmove_clock() as usize).min(self.plies_from_null);
        let key = self.board.hash();
        self.keys.iter().rev().take(window).skip(1).step_by(2).any(|&k| k == key)
    }

    fn insufficient_material(&self) -> bool {
        let b = &self.board;
        let heavy = b.pieces(Piece::Pawn) | b.pieces(Piece::Rook) | b.pieces(Piece::Queen);
        if !heavy.is_empty() { return false; }
        let minors = b.pieces(Piece::Knight) | b.pieces(Piece::Bishop);
        minors.len() <= 1
    }

    /// Draw by fifty-move rule, repetition or bare minors. A fifty-move count
    /// reached while mated is not a draw.
    pub fn is_draw(&self) -> bool {
        if self.board.halfmove_clock() >= 100 && (!self.in_check() || self.has_legal_moves()) {
            return true;
        }
        self.is_repetition() || self.insufficient_material()
    }

    pub fn nodes_searched(&self) -> u64 { self.nodes }

    pub fn set_nodes_searched(&mut self, n: u64) { self.nodes = n; }

    /// Copy handed to a split-point participant: same board and history, fresh node count.
    pub fn split_copy(&self) -> Self {
        let mut pos = self.clone();
        pos.nodes = 0;
        pos
    }

    /// Parses coordinate notation. Accepts castling both as king-takes-rook
    /// (`e1h1`) and as the two-square king step (`e1g1`).
    pub fn parse_move(&self, uci: &str) -> Result<Move> {
        let legal = self.legal_moves();
        if let Some(&m) = legal.iter().find(|m| format!("{m}") == uci) {
            return Ok(m);
        }
        let parsed: Move = uci.parse().map_err(|_| EngineError::IllegalMove(uci.to_string()))?;
        if self.board.piece_on(parsed.from) == Some(Piece::King) {
            let df = parsed.to.file() as i32 - parsed.from.file() as i32;
            if df.abs() == 2 {
                let castles = legal.iter().copied().find(|m| {
                    m.from == parsed.from
                        && self.board.colors(self.side_to_move()).has(m.to)
                        && (m.to.file() as i32 - m.from.file() as i32).signum() == df.signum()
                });
                if let Some(m) = castles { return Ok(m); }
            }
        }
        Err(EngineError::IllegalMove(uci.to_string()))
    }

    pub fn fen(&self) -> String { format!("{}", self.board) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_unmake_restores_key() {
        let mut pos = Position::startpos();
        let k0 = pos.key();
        let mv = pos.parse_move("e2e4").unwrap();
        pos.do_move(mv);
        assert_ne!(pos.key(), k0);
        pos.undo_move();
        assert_eq!(pos.key(), k0);
        assert_eq!(pos.nodes_searched(), 1);
    }

    #[test]
    fn knight_shuffle_is_repetition() {
        let mut pos = Position::startpos();
        for m in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            let mv = pos.parse_move(m).unwrap();
            pos.do_move(mv);
        }
        assert!(pos.is_draw());
    }

    #[test]
    fn standard_castling_notation_is_accepted() {
        let pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let a = pos.parse_move("e1g1").unwrap();
        let b = pos.parse_move("e1h1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn en_passant_counts_as_capture() {
        let pos = Position::from_fen("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2").unwrap();
        let ep = pos.parse_move("e5d6").unwrap();
        assert!(pos.is_capture(ep));
        assert_eq!(pos.captured_piece(ep), Some(Piece::Pawn));
    }

    #[test]
    fn bad_fen_is_an_error() {
        assert!(matches!(Position::from_fen("not a fen"), Err(EngineError::InvalidFen { .. })));
    }
}
