//! Specialised evaluators for a closed set of material configurations.
//!
//! A material signature maps straight to a plain function pointer plus the
//! strong side it was registered for.

use std::collections::HashMap;
use std::sync::OnceLock;

use cozy_chess::{Board, Color, Piece, Square};

use crate::search::eval::{piece_value, KNOWN_WIN};
use crate::search::Value;

/// Scores a position from the strong side's point of view.
pub type EndgameFn = fn(&Board, Color) -> Value;

#[derive(Clone, Copy)]
pub struct EndgameEntry {
    pub func: EndgameFn,
    pub strong: Color,
}

const SIGNATURE_PIECES: [Piece; 5] = [Piece::Pawn, Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen];

fn color_index(c: Color) -> u32 { if c == Color::White { 0 } else { 1 } }

fn count(board: &Board, color: Color, piece: Piece) -> u64 {
    (board.colors(color) & board.pieces(piece)).len() as u64
}

/// Packs non-king piece counts, four bits per (color, piece).
pub fn material_key(board: &Board) -> u64 {
    let mut key = 0u64;
    for color in [Color::White, Color::Black] {
        for (i, &piece) in SIGNATURE_PIECES.iter().enumerate() {
            let shift = 4 * (color_index(color) * 5 + i as u32);
            key |= count(board, color, piece).min(15) << shift;
        }
    }
    key
}

fn letter_index(ch: char) -> Option<usize> {
    match ch {
        'P' => Some(0),
        'N' => Some(1),
        'B' => Some(2),
        'R' => Some(3),
        'Q' => Some(4),
        _ => None,
    }
}

/// Signature for a code such as `"KBNK"` with `strong` owning the left-hand pieces.
fn key_for_code(code: &str, strong: Color) -> u64 {
    let split = code[1..].find('K').map(|i| i + 1).unwrap_or(code.len());
    let (left, right) = code.split_at(split);
    let mut key = 0u64;
    for (side, color) in [(left, strong), (right, !strong)] {
        for ch in side.chars() {
            if let Some(i) = letter_index(ch) {
                key += 1u64 << (4 * (color_index(color) * 5 + i as u32));
            }
        }
    }
    key
}

pub struct Endgames {
    map: HashMap<u64, EndgameEntry>,
}

impl Endgames {
    fn new() -> Self {
        let mut eg = Self { map: HashMap::new() };
        eg.add("KNNK", evaluate_knnk);
        eg.add("KBNK", evaluate_kbnk);
        eg.add("KRKP", evaluate_krkp);
        eg.add("KRKB", evaluate_krkb);
        eg.add("KRKN", evaluate_krkn);
        eg.add("KQKP", evaluate_kqkp);
        eg.add("KQKR", evaluate_kqkr);
        eg
    }

    fn add(&mut self, code: &str, func: EndgameFn) {
        for strong in [Color::White, Color::Black] {
            self.map.insert(key_for_code(code, strong), EndgameEntry { func, strong });
        }
    }

    pub fn probe(&self, board: &Board) -> Option<EndgameEntry> {
        if let Some(e) = self.map.get(&material_key(board)) {
            return Some(*e);
        }
        // Generic "mate the lone king" for anything with at least a rook's worth.
        for strong in [Color::White, Color::Black] {
            let weak = !strong;
            if board.colors(weak).len() == 1 && non_pawn_material(board, strong) >= piece_value(Piece::Rook) {
                return Some(EndgameEntry { func: evaluate_kxk, strong });
            }
        }
        None
    }
}

pub fn endgames() -> &'static Endgames {
    static TABLE: OnceLock<Endgames> = OnceLock::new();
    TABLE.get_or_init(Endgames::new)
}

/// Evaluates through the table, returning a side-to-move relative score.
pub fn probe(board: &Board) -> Option<Value> {
    let entry = endgames().probe(board)?;
    let v = (entry.func)(board, entry.strong);
    Some(if board.side_to_move() == entry.strong { v } else { -v })
}

fn non_pawn_material(board: &Board, color: Color) -> Value {
    [Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen]
        .iter()
        .map(|&p| count(board, color, p) as Value * piece_value(p))
        .sum()
}

fn file_rank(sq: Square) -> (i32, i32) { (sq.file() as i32, sq.rank() as i32) }

fn distance(a: Square, b: Square) -> i32 {
    let (fa, ra) = file_rank(a);
    let (fb, rb) = file_rank(b);
    (fa - fb).abs().max((ra - rb).abs())
}

fn push_to_edge(sq: Square) -> Value {
    let (f, r) = file_rank(sq);
    let fd = (2 * f - 7).abs();
    let rd = (2 * r - 7).abs();
    10 * (fd + rd) - 20
}

fn push_close(d: i32) -> Value { 140 - 20 * d }

fn push_away(d: i32) -> Value { 15 * d - 15 }

fn evaluate_kxk(board: &Board, strong: Color) -> Value {
    let weak = !strong;
    let winner = board.king(strong);
    let loser = board.king(weak);
    let mut result = non_pawn_material(board, strong)
        + count(board, strong, Piece::Pawn) as Value * piece_value(Piece::Pawn)
        + push_to_edge(loser)
        + push_close(distance(winner, loser));

    let ours = board.colors(strong);
    let bishops = ours & board.pieces(Piece::Bishop);
    let light_bishop = bishops.into_iter().any(is_light);
    let dark_bishop = bishops.into_iter().any(|s| !is_light(s));
    let mating_material = !(ours & (board.pieces(Piece::Queen) | board.pieces(Piece::Rook))).is_empty()
        || (light_bishop && dark_bishop)
        || (!bishops.is_empty() && !(ours & board.pieces(Piece::Knight)).is_empty());
    if mating_material {
        result += KNOWN_WIN;
    }
    result
}

fn is_light(sq: Square) -> bool {
    let (f, r) = file_rank(sq);
    (f + r) % 2 == 1
}

fn evaluate_kbnk(board: &Board, strong: Color) -> Value {
    let winner = board.king(strong);
    let loser = board.king(!strong);
    let bishop_light = (board.colors(strong) & board.pieces(Piece::Bishop)).into_iter().any(is_light);
    let corners = if bishop_light { [Square::A8, Square::H1] } else { [Square::A1, Square::H8] };
    let corner_dist = corners.iter().map(|&c| distance(loser, c)).min().unwrap_or(7);
    KNOWN_WIN + push_close(distance(winner, loser)) + 200 - 25 * corner_dist
}

fn evaluate_knnk(_board: &Board, _strong: Color) -> Value { 0 }

/// File and rank with the strong side playing up the board.
fn relative(sq: Square, strong: Color) -> (i32, i32) {
    let (f, r) = file_rank(sq);
    if strong == Color::White { (f, r) } else { (f, 7 - r) }
}

fn rel_distance(a: (i32, i32), b: (i32, i32)) -> i32 { (a.0 - b.0).abs().max((a.1 - b.1).abs()) }

fn weak_pawn(board: &Board, strong: Color) -> Option<Square> {
    (board.colors(!strong) & board.pieces(Piece::Pawn)).into_iter().next()
}

fn evaluate_krkp(board: &Board, strong: Color) -> Value {
    let (Some(pawn), Some(rook)) =
        (weak_pawn(board, strong), (board.colors(strong) & board.pieces(Piece::Rook)).into_iter().next())
    else {
        return 0;
    };
    let wk = relative(board.king(strong), strong);
    let bk = relative(board.king(!strong), strong);
    let r = relative(rook, strong);
    let p = relative(pawn, strong);
    let queening = (p.0, 0);
    let stop = (p.0, p.1 - 1);
    let strong_to_move = board.side_to_move() == strong;

    if wk.0 == p.0 && wk.1 < p.1 {
        // Our king blocks the pawn.
        piece_value(Piece::Rook) - rel_distance(wk, p)
    } else if rel_distance(bk, p) >= 3 + i32::from(!strong_to_move) && rel_distance(bk, r) >= 3 {
        piece_value(Piece::Rook) - rel_distance(wk, p)
    } else if bk.1 <= 2 && rel_distance(bk, p) == 1 && wk.1 >= 3 && rel_distance(wk, p) > 2 + i32::from(strong_to_move) {
        80 - 8 * rel_distance(wk, p)
    } else {
        200 - 8 * (rel_distance(wk, stop) - rel_distance(bk, stop) - rel_distance(p, queening))
    }
}

fn evaluate_kqkp(board: &Board, strong: Color) -> Value {
    let winner = board.king(strong);
    let loser = board.king(!strong);
    let mut result = push_close(distance(winner, loser));
    let Some(pawn) = weak_pawn(board, strong) else { return result };
    let p = relative(pawn, strong);
    // A rook or bishop pawn on its seventh, next to its king, holds the draw.
    let drawish_file = matches!(p.0, 0 | 2 | 5 | 7);
    if p.1 != 1 || distance(loser, pawn) != 1 || !drawish_file {
        result += piece_value(Piece::Queen) - piece_value(Piece::Pawn);
    }
    result
}

fn evaluate_krkb(board: &Board, strong: Color) -> Value { push_to_edge(board.king(!strong)) }

fn evaluate_krkn(board: &Board, strong: Color) -> Value {
    let loser = board.king(!strong);
    let knight = (board.colors(!strong) & board.pieces(Piece::Knight)).into_iter().next();
    push_to_edge(loser) + knight.map(|n| push_away(distance(loser, n))).unwrap_or(0)
}

fn evaluate_kqkr(board: &Board, strong: Color) -> Value {
    let winner = board.king(strong);
    let loser = board.king(!strong);
    piece_value(Piece::Queen) - piece_value(Piece::Rook) + push_to_edge(loser) + push_close(distance(winner, loser))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(fen: &str) -> Board { Board::from_fen(fen, false).unwrap() }

    #[test]
    fn kbnk_is_found_for_both_colors() {
        let w = board("8/8/8/4k3/8/8/8/2BNK3 w - - 0 1");
        let b = board("2bnk3/8/8/8/4K3/8/8/8 w - - 0 1");
        assert_eq!(endgames().probe(&w).map(|e| e.strong), Some(Color::White));
        assert_eq!(endgames().probe(&b).map(|e| e.strong), Some(Color::Black));
        // White to move but black is the strong side: score flips.
        assert!(probe(&b).unwrap() < -KNOWN_WIN / 2);
    }

    #[test]
    fn knnk_is_a_draw() {
        let b = board("8/8/8/4k3/8/8/8/1NN1K3 w - - 0 1");
        assert_eq!(probe(&b), Some(0));
    }

    #[test]
    fn krk_pushes_king_to_edge() {
        let centre = board("8/8/8/4k3/8/8/8/R3K3 w - - 0 1");
        let edge = board("4k3/8/4K3/8/8/8/8/R7 w - - 0 1");
        let c = probe(&centre).unwrap();
        let e = probe(&edge).unwrap();
        assert!(c > KNOWN_WIN && e > c, "edge {e} should beat centre {c}");
    }

    #[test]
    fn ordinary_material_is_not_specialised() {
        assert!(endgames().probe(&Board::default()).is_none());
    }

    #[test]
    fn krkp_blockading_king_wins() {
        let b = board("8/7k/8/8/4p3/8/4K3/R7 w - - 0 1");
        let v = probe(&b).unwrap();
        assert!(v > piece_value(Piece::Rook) - 10, "blockade scored {v}");
    }

    #[test]
    fn krkp_far_advanced_pawn_is_drawish() {
        let b = board("R7/7K/8/8/8/8/1pk5/8 w - - 0 1");
        let v = probe(&b).unwrap();
        assert!(v > 0 && v < 100, "advanced pawn scored {v}");
    }

    #[test]
    fn kqkp_bishop_pawn_on_seventh_holds() {
        let drawish = board("7Q/8/6K1/8/8/8/2p5/1k6 w - - 0 1");
        let winning = board("7Q/8/6K1/8/8/8/3p4/2k5 w - - 0 1");
        let d = probe(&drawish).unwrap();
        let w = probe(&winning).unwrap();
        assert!(d < 200, "c-pawn scored {d}");
        assert!(w > piece_value(Piece::Queen) / 2, "d-pawn scored {w}");
    }
}
