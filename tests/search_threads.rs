use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use splitbot::{EngineConfig, Limits, Position, ThreadPool};

fn search_startpos(threads: usize) -> (splitbot::SearchResult, ThreadPool) {
    let config = EngineConfig { threads, hash_mb: 8, min_split_depth: 3, ..EngineConfig::default() };
    let pool = ThreadPool::init(&config).unwrap();
    let r = pool.search(&Position::startpos(), Limits::depth(6)).unwrap();
    (r, pool)
}

#[test]
fn one_and_four_threads_agree_and_fill_the_root_entry() {
    let root = Position::startpos();
    let mut results = Vec::new();
    for threads in [1, 4] {
        let (r, pool) = search_startpos(threads);
        let mv = r.bestmove.expect("a move from the start position");
        assert!(root.legal_moves().contains(&mv), "{threads} threads: illegal move {mv}");
        assert_eq!(r.depth, 6);
        assert_eq!(r.pv.first(), Some(&mv));
        let e = pool.tt().probe(root.key()).expect("root entry");
        assert!(e.depth >= 6, "{threads} threads: root entry depth {}", e.depth);
        assert!(r.score_cp.abs() < 200, "{threads} threads: odd start score {}", r.score_cp);
        results.push((mv, r.score_cp));
    }
    let (serial_move, serial_score) = results[0];
    let (split_move, split_score) = results[1];
    assert_eq!(split_move, serial_move);
    // Cutoff timing may shift the value a little, never by a real amount.
    assert!(
        split_score >= serial_score - 50,
        "split search scored {split_score}, serial {serial_score}"
    );
}

#[test]
fn node_counts_add_up_across_threads() {
    let (r, pool) = search_startpos(4);
    let per_thread: u64 = pool.threads().iter().map(|t| t.nodes_searched()).sum();
    assert_eq!(r.nodes, per_thread);
    assert_eq!(r.nodes, pool.total_nodes());
    assert!(r.nodes > 0);
}

#[test]
fn info_handler_sees_every_iteration() {
    let config = EngineConfig { threads: 2, hash_mb: 4, ..EngineConfig::default() };
    let pool = ThreadPool::init(&config).unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&seen);
    pool.set_info_handler(move |info| {
        assert!(!info.pv.is_empty());
        s.fetch_max(info.depth as usize, Ordering::SeqCst);
    });
    pool.search(&Position::startpos(), Limits::depth(5)).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 5);
}

#[test]
fn repeated_searches_reuse_the_pool() {
    let config = EngineConfig { threads: 3, hash_mb: 4, min_split_depth: 2, ..EngineConfig::default() };
    let pool = ThreadPool::init(&config).unwrap();
    let pos = Position::from_fen_and_moves("startpos", &["e2e4", "e7e5", "g1f3"]).unwrap();
    for depth in 3..=6 {
        let r = pool.search(&pos, Limits::depth(depth)).unwrap();
        assert_eq!(r.depth, depth);
        assert!(pos.legal_moves().contains(&r.bestmove.unwrap()));
    }
}
