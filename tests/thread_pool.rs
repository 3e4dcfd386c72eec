use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use splitbot::{EngineConfig, EngineError, Limits, Position, ThreadPool};

fn config(threads: usize) -> EngineConfig { EngineConfig { threads, hash_mb: 4, ..EngineConfig::default() } }

#[test]
fn resize_and_exit_track_live_threads() {
    let mut pool = ThreadPool::init(&config(4)).unwrap();
    // Workers plus the timer.
    assert_eq!(pool.size(), 4);
    assert_eq!(pool.live_threads(), 5);

    pool.resize(2).unwrap();
    assert_eq!(pool.size(), 2);
    assert_eq!(pool.live_threads(), 3);

    pool.resize(6).unwrap();
    assert_eq!(pool.live_threads(), 7);
    assert_eq!(pool.threads().iter().map(|t| t.idx).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);

    pool.exit();
    assert_eq!(pool.live_threads(), 0);
    pool.exit();
    assert_eq!(pool.size(), 0);
}

#[test]
fn invalid_sizes_are_rejected() {
    let mut pool = ThreadPool::init(&config(1)).unwrap();
    assert!(matches!(pool.resize(0), Err(EngineError::InvalidThreadCount(0))));
    assert!(matches!(pool.resize(65), Err(EngineError::InvalidThreadCount(65))));
    assert_eq!(pool.size(), 1);
    assert!(matches!(ThreadPool::init(&config(0)), Err(EngineError::InvalidThreadCount(0))));
    assert!(matches!(pool.set_hash_size_bytes(16), Err(EngineError::InvalidHashSize(16))));
}

#[test]
fn search_after_exit_fails() {
    let mut pool = ThreadPool::init(&config(2)).unwrap();
    pool.exit();
    assert!(matches!(pool.start_thinking(&Position::startpos(), Limits::depth(1)), Err(EngineError::PoolNotRunning)));
}

fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let t0 = Instant::now();
    while t0.elapsed() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

#[test]
fn infinite_search_runs_until_stopped() {
    let config = EngineConfig { threads: 6, hash_mb: 4, min_split_depth: 2, fake_split: false };
    let pool = ThreadPool::init(&config).unwrap();
    for _ in 0..3 {
        pool.start_thinking(&Position::startpos(), Limits::infinite()).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert!(pool.is_thinking());

        let t0 = Instant::now();
        pool.request_stop();
        pool.wait_for_think_finished();
        let took = t0.elapsed();
        assert!(took < Duration::from_secs(2), "stop took {took:?}");
        assert!(!pool.is_thinking());
        for th in pool.threads().iter() {
            assert!(!th.is_searching(), "thread {} still searching", th.idx);
            assert_eq!(th.split_points_in_use(), 0, "thread {} still holds split points", th.idx);
        }
        let r = pool.result();
        assert!(r.bestmove.is_some());
        assert!(r.depth >= 1);
    }
}

#[test]
fn woken_threads_start_searching() {
    let config = EngineConfig { threads: 4, hash_mb: 4, min_split_depth: 2, fake_split: false };
    let pool = ThreadPool::init(&config).unwrap();
    pool.start_thinking(&Position::startpos(), Limits::infinite()).unwrap();
    assert!(wait_until(Duration::from_secs(2), || pool.is_thinking()));

    let threads = pool.threads();
    assert!(
        wait_until(Duration::from_secs(5), || threads[0].nodes_searched() > 0),
        "main thread never left idle"
    );
    // Recruitment wakes parked helpers at the first split.
    assert!(
        wait_until(Duration::from_secs(5), || threads[1..].iter().any(|t| t.nodes_searched() > 0)),
        "no helper thread was ever woken"
    );

    pool.request_stop();
    assert!(wait_until(Duration::from_secs(2), || !pool.is_thinking()), "search did not finish");
    pool.wait_for_think_finished();
    assert!(pool.result().bestmove.is_some());
}

#[test]
fn ponderhit_after_finished_search_stops_it() {
    let pool = ThreadPool::init(&config(1)).unwrap();
    let limits = Limits { ponder: true, ..Limits::depth(2) };
    pool.start_thinking(&Position::startpos(), limits).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    // Depth 2 is long done, but the move is held back while pondering.
    assert!(pool.is_thinking());
    pool.ponderhit();
    pool.wait_for_think_finished();
    assert_eq!(pool.result().depth, 2);
}

#[test]
fn movetime_is_respected() {
    let pool = ThreadPool::init(&config(2)).unwrap();
    let t0 = Instant::now();
    let r = pool.search(&Position::startpos(), Limits::movetime(Duration::from_millis(200))).unwrap();
    let elapsed = t0.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "stopped early after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "overran: {elapsed:?}");
    assert!(r.bestmove.is_some());
}

#[test]
fn node_limit_stops_the_search() {
    let pool = ThreadPool::init(&config(1)).unwrap();
    let r = pool.search(&Position::startpos(), Limits::nodes(20_000)).unwrap();
    assert!(r.nodes >= 20_000, "stopped at {} nodes", r.nodes);
    assert!(r.nodes < 2_000_000, "overran to {} nodes", r.nodes);
    assert!(r.bestmove.is_some());
}

#[test]
fn apply_config_resizes_and_rehashes() {
    let mut pool = ThreadPool::init(&config(1)).unwrap();
    let before = pool.tt().capacity();
    let next = EngineConfig { threads: 3, hash_mb: 8, min_split_depth: 5, fake_split: false };
    pool.apply_config(&next).unwrap();
    assert_eq!(pool.size(), 3);
    assert!(pool.tt().capacity() > before);
    assert_eq!(pool.config(), &next);
}

#[test]
fn clear_hash_empties_the_table() {
    let pool = ThreadPool::init(&config(1)).unwrap();
    pool.search(&Position::startpos(), Limits::depth(4)).unwrap();
    assert!(!pool.tt().is_empty());
    pool.clear_hash();
    assert!(pool.tt().is_empty());
}
