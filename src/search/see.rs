use cozy_chess::{
    get_bishop_moves, get_king_moves, get_knight_moves, get_pawn_attacks, get_rook_moves, BitBoard, Board, Color,
    Move, Piece, Square,
};

use crate::search::eval::piece_value;
use crate::search::Value;

const ORDER: [Piece; 5] = [Piece::Pawn, Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen];

fn attackers_to(board: &Board, sq: Square, occupied: BitBoard) -> BitBoard {
    let pawns = board.pieces(Piece::Pawn);
    let diag = board.pieces(Piece::Bishop) | board.pieces(Piece::Queen);
    let line = board.pieces(Piece::Rook) | board.pieces(Piece::Queen);
    (get_pawn_attacks(sq, Color::Black) & pawns & board.colors(Color::White))
        | (get_pawn_attacks(sq, Color::White) & pawns & board.colors(Color::Black))
        | (get_knight_moves(sq) & board.pieces(Piece::Knight))
        | (get_king_moves(sq) & board.pieces(Piece::King))
        | (get_bishop_moves(sq, occupied) & diag)
        | (get_rook_moves(sq, occupied) & line)
}

/// Removes the least valuable attacker from `occupied` and uncovers x-rays behind it.
/// A king is returned without touching the bitboards: it always captures last.
fn pop_least_valuable(
    board: &Board,
    to: Square,
    side_attackers: BitBoard,
    occupied: &mut BitBoard,
    attackers: &mut BitBoard,
) -> Piece {
    for piece in ORDER {
        let Some(sq) = (side_attackers & board.pieces(piece)).into_iter().next() else { continue };
        *occupied ^= sq.bitboard();
        if matches!(piece, Piece::Pawn | Piece::Bishop | Piece::Queen) {
            *attackers |= get_bishop_moves(to, *occupied) & (board.pieces(Piece::Bishop) | board.pieces(Piece::Queen));
        }
        if matches!(piece, Piece::Rook | Piece::Queen) {
            *attackers |= get_rook_moves(to, *occupied) & (board.pieces(Piece::Rook) | board.pieces(Piece::Queen));
        }
        *attackers &= *occupied;
        return piece;
    }
    Piece::King
}

/// Static exchange evaluation of `mv` in centipawns, from the mover's side.
/// Pins are ignored; castling scores zero.
pub fn see(board: &Board, mv: Move) -> Value {
    let (from, to) = (mv.from, mv.to);
    let Some(mover) = board.piece_on(from) else { return 0 };
    let mut stm = board.side_to_move();
    if board.colors(stm).has(to) {
        return 0;
    }

    let mut occupied = board.occupied() ^ from.bitboard();
    let mut swap = [0 as Value; 32];
    swap[0] = board.piece_on(to).map_or(0, piece_value);
    if mover == Piece::Pawn && from.file() != to.file() && board.piece_on(to).is_none() {
        let captured = Square::new(to.file(), from.rank());
        occupied ^= captured.bitboard();
        swap[0] = piece_value(Piece::Pawn);
    }

    let mut attackers = attackers_to(board, to, occupied) & occupied;
    stm = !stm;
    let mut side_attackers = attackers & board.colors(stm);
    if side_attackers.is_empty() {
        return swap[0];
    }

    let mut captured = mover;
    let mut n = 1;
    loop {
        swap[n] = -swap[n - 1] + piece_value(captured);
        captured = pop_least_valuable(board, to, side_attackers, &mut occupied, &mut attackers);
        if captured == Piece::King {
            // The king may only take last.
            if side_attackers == attackers {
                n += 1;
            }
            break;
        }
        stm = !stm;
        side_attackers = attackers & board.colors(stm);
        n += 1;
        if side_attackers.is_empty() || n >= swap.len() {
            break;
        }
    }
    while n > 1 {
        n -= 1;
        swap[n - 1] = swap[n - 1].min(-swap[n]);
    }
    swap[0]
}

pub fn see_sign(board: &Board, mv: Move) -> Value {
    let victim = board.piece_on(mv.to).map_or(0, piece_value);
    let attacker = board.piece_on(mv.from).map_or(0, piece_value);
    // Winning or equal captures by value need no exchange.
    if attacker <= victim && !board.colors(board.side_to_move()).has(mv.to) {
        return 1;
    }
    see(board, mv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(board: &Board, from: Square, to: Square) -> Move {
        let mut found = None;
        board.generate_moves(|ml| {
            for m in ml {
                if m.from == from && m.to == to {
                    found = Some(m);
                }
            }
            found.is_some()
        });
        found.expect("move must be legal")
    }

    #[test]
    fn rook_takes_king_defended_pawn_loses() {
        let b = Board::from_fen("6k1/2R4p/6p1/8/6K1/6P1/8/8 w - - 3 38", false).unwrap();
        assert!(see(&b, mv(&b, Square::C7, Square::H7)) < 0);
    }

    #[test]
    fn pawn_takes_undefended_knight() {
        let b = Board::from_fen("4k3/8/8/3n4/4P3/8/8/4K3 w - - 0 1", false).unwrap();
        assert_eq!(see(&b, mv(&b, Square::E4, Square::D5)), 320);
    }

    #[test]
    fn xray_rook_backs_up_the_exchange() {
        // Rxd5 Rxd5 Rxd5: white ends a pawn up.
        let b = Board::from_fen("3rk3/8/8/3p4/8/8/3R4/3RK3 w - - 0 1", false).unwrap();
        assert_eq!(see(&b, mv(&b, Square::D2, Square::D5)), 100);
    }
}
