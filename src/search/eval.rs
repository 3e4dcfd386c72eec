use cozy_chess::{Board, Color, Piece, Square};

use crate::board::Position;
use crate::search::{endgame, Value};

const PAWN: Value = 100;
const KNIGHT: Value = 320;
const BISHOP: Value = 330;
const ROOK: Value = 500;
const QUEEN: Value = 900;

// Mate scoring helpers
pub const MATE_SCORE: Value = 30_000;
pub const DRAW_SCORE: Value = 0;
pub const KNOWN_WIN: Value = 10_000;

const TEMPO: Value = 10;
const MAX_PHASE: Value = 24;

pub fn piece_value(piece: Piece) -> Value {
    match piece {
        Piece::Pawn => PAWN,
        Piece::Knight => KNIGHT,
        Piece::Bishop => BISHOP,
        Piece::Rook => ROOK,
        Piece::Queen => QUEEN,
        Piece::King => 0,
    }
}

fn count_piece(board: &Board, color: Color, piece: Piece) -> Value {
    let bb = board.colors(color) & board.pieces(piece);
    bb.len() as Value
}

// Side-agnostic material in centipawns: positive means White has more material.
pub fn material_eval_cp_side_agnostic(board: &Board) -> Value {
    let w = Color::White;
    let b = Color::Black;
    [Piece::Pawn, Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen]
        .iter()
        .map(|&p| (count_piece(board, w, p) - count_piece(board, b, p)) * piece_value(p))
        .sum()
}

// 0 (centre) .. 12 (corner)
fn centre_distance(sq: Square) -> Value {
    let f = sq.file() as Value;
    let r = sq.rank() as Value;
    (2 * f - 7).abs() + (2 * r - 7).abs() - 2
}

fn relative_rank(color: Color, sq: Square) -> Value {
    let r = sq.rank() as Value;
    if color == Color::White { r } else { 7 - r }
}

fn game_phase(board: &Board) -> Value {
    let minors = (board.pieces(Piece::Knight) | board.pieces(Piece::Bishop)).len() as Value;
    let rooks = board.pieces(Piece::Rook).len() as Value;
    let queens = board.pieces(Piece::Queen).len() as Value;
    (minors + 2 * rooks + 4 * queens).min(MAX_PHASE)
}

/// Placement bonus for one side as (middlegame, endgame).
fn placement(board: &Board, color: Color) -> (Value, Value) {
    let ours = board.colors(color);
    let (mut mg, mut eg) = (0, 0);
    for sq in ours & board.pieces(Piece::Pawn) {
        let adv = relative_rank(color, sq) - 1;
        let file = sq.file() as Value;
        let central = if (2..=5).contains(&file) { 4 } else { 0 };
        mg += 3 * adv + central * adv.min(3);
        eg += 8 * adv;
    }
    for sq in ours & board.pieces(Piece::Knight) {
        let c = 12 - centre_distance(sq);
        mg += 4 * c;
        eg += 3 * c;
    }
    for sq in ours & board.pieces(Piece::Bishop) {
        let c = 12 - centre_distance(sq);
        mg += 2 * c;
        eg += 2 * c;
    }
    for sq in ours & board.pieces(Piece::Queen) {
        let c = 12 - centre_distance(sq);
        mg += c;
        eg += 2 * c;
    }
    let king = board.king(color);
    let c = 12 - centre_distance(king);
    mg -= 3 * c + 6 * relative_rank(color, king);
    eg += 4 * c;
    (mg, eg)
}

/// Static evaluation from the side to move's point of view.
pub fn evaluate(pos: &Position) -> Value {
    eval_cp(pos.board())
}

pub fn eval_cp(board: &Board) -> Value {
    if let Some(v) = endgame::probe(board) {
        return v;
    }
    let (wmg, weg) = placement(board, Color::White);
    let (bmg, beg) = placement(board, Color::Black);
    let phase = game_phase(board);
    let positional = ((wmg - bmg) * phase + (weg - beg) * (MAX_PHASE - phase)) / MAX_PHASE;
    let score = material_eval_cp_side_agnostic(board) + positional;
    let stm = if board.side_to_move() == Color::White { score } else { -score };
    stm + TEMPO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_is_symmetric_under_color_flip() {
        let w = Board::from_fen("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3", false).unwrap();
        let b = Board::from_fen("rnbqkb1r/pppp1ppp/5n2/4p3/4P3/2N5/PPPP1PPP/R1BQKBNR b KQkq - 2 3", false).unwrap();
        assert_eq!(eval_cp(&w), eval_cp(&b));
    }

    #[test]
    fn extra_queen_dominates() {
        let b = Board::from_fen("4k3/pppppppp/8/8/8/8/PPPPPPPP/3QK3 w - - 0 1", false).unwrap();
        assert!(eval_cp(&b) > 700);
    }
}
