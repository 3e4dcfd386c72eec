use pretty_assertions::assert_eq;
use splitbot::{EngineConfig, Limits, Position, ThreadPool};

const ITALIAN: &str = "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 2 3";

fn run(config: EngineConfig, fen: &str, depth: i32) -> splitbot::SearchResult {
    let pool = ThreadPool::init(&config).unwrap();
    let pos = Position::from_fen(fen).unwrap();
    pool.search(&pos, Limits::depth(depth)).unwrap()
}

#[test]
fn fake_split_matches_serial_search() {
    let serial = EngineConfig { threads: 1, hash_mb: 4, ..EngineConfig::default() };
    let fake = EngineConfig { threads: 4, hash_mb: 4, min_split_depth: 2, fake_split: true };
    for fen in [ITALIAN, "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1"] {
        let r1 = run(serial.clone(), fen, 6);
        let r4 = run(fake.clone(), fen, 6);
        assert_eq!(r4.score_cp, r1.score_cp, "fake split score differs on {fen}");
        assert_eq!(r4.bestmove, r1.bestmove, "fake split move differs on {fen}");
        assert_eq!(r4.nodes, r1.nodes, "fake split visited a different tree on {fen}");
    }
}

#[test]
fn split_search_returns_legal_move() {
    let config = EngineConfig { threads: 4, hash_mb: 8, min_split_depth: 2, fake_split: false };
    let r = run(config, ITALIAN, 7);
    let pos = Position::from_fen(ITALIAN).unwrap();
    let mv = r.bestmove.expect("a move");
    assert!(pos.legal_moves().contains(&mv));
    assert_eq!(r.depth, 7);
}

#[test]
fn split_points_are_released_after_search() {
    let config = EngineConfig { threads: 3, hash_mb: 4, min_split_depth: 2, fake_split: false };
    let pool = ThreadPool::init(&config).unwrap();
    pool.search(&Position::startpos(), Limits::depth(6)).unwrap();
    for th in pool.threads().iter() {
        assert_eq!(th.split_points_in_use(), 0, "thread {} still holds split points", th.idx);
        assert!(!th.is_searching(), "thread {} still searching", th.idx);
    }
    assert!(pool.available_slave(0).is_some());
}
