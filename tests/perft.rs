use cozy_chess::Board;
use pretty_assertions::assert_eq;
use splitbot::perft::{divide, perft, perft_parallel};

const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

#[test]
fn perft_startpos_small_depths() {
    let b = Board::default();
    assert_eq!(perft(&b, 1), 20);
    assert_eq!(perft(&b, 2), 400);
    assert_eq!(perft(&b, 3), 8902);
    assert_eq!(perft(&b, 4), 197281);
}

#[test]
fn perft_kiwipete() {
    let b = Board::from_fen(KIWIPETE, false).unwrap();
    assert_eq!(perft(&b, 1), 48);
    assert_eq!(perft(&b, 2), 2039);
    assert_eq!(perft_parallel(&b, 3), 97862);
}

#[test]
fn perft_rook_endgame() {
    let b = Board::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", false).unwrap();
    assert_eq!(perft_parallel(&b, 4), 43238);
}

#[test]
fn divide_matches_serial_count() {
    let b = Board::from_fen(KIWIPETE, false).unwrap();
    let split = divide(&b, 2, |_, _| {});
    assert_eq!(split.len(), 48);
    assert_eq!(split.iter().map(|(_, n)| *n).sum::<u64>(), 2039);
}
