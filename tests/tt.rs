use std::sync::Arc;

use pretty_assertions::assert_eq;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use splitbot::search::tt::{Bound, TranspositionTable};

#[test]
fn tt_capacity_enforced() {
    let mut tt = TranspositionTable::default();
    tt.set_capacity_entries(8);
    for i in 0..64u64 {
        tt.store(i, (i % 4) as i32, Bound::Exact, i as i32, None);
    }
    assert!(tt.len() <= 8, "tt size {} exceeds capacity", tt.len());
    assert_eq!(tt.capacity(), 8);
}

#[test]
fn tt_depth_preferred_on_eviction() {
    // One bucket: every key competes for the same four ways.
    let tt = TranspositionTable::with_entries(4);
    tt.store(1, 6, Bound::Exact, 0, None);
    for k in 2..=4 {
        tt.store(k, 1, Bound::Exact, 0, None);
    }
    tt.store(5, 1, Bound::Exact, 0, None);
    assert!(tt.probe(1).is_some(), "deep entry evicted unexpectedly");
    assert_eq!(tt.len(), 4);
}

#[test]
fn tt_stale_generation_goes_first() {
    let tt = TranspositionTable::with_entries(4);
    tt.store(1, 20, Bound::Exact, 0, None);
    tt.new_generation();
    for k in 2..=4 {
        tt.store(k, 1, Bound::Lower, 0, None);
    }
    tt.store(5, 1, Bound::Lower, 0, None);
    assert!(tt.probe(1).is_none(), "stale deep entry should be replaced first");
    assert!(tt.probe(5).is_some());
}

#[test]
fn tt_probe_refreshes_generation() {
    let tt = TranspositionTable::with_entries(4);
    tt.store(9, 3, Bound::Upper, -12, None);
    tt.new_generation();
    assert_eq!(tt.probe(9).map(|e| e.gen), Some(tt.generation()));
}

#[test]
fn tt_round_trip_and_clear() {
    let tt = TranspositionTable::new(1);
    let mv = "g1f3".parse().unwrap();
    tt.store(0xDEAD_BEEF, 7, Bound::Lower, 42, Some(mv));
    let e = tt.probe(0xDEAD_BEEF).unwrap();
    assert_eq!((e.depth, e.score, e.bound, e.mv), (7, 42, Bound::Lower, Some(mv)));
    assert!(tt.probe(0xDEAD_BEEE).is_none());
    tt.clear();
    assert!(tt.is_empty());
    assert_eq!(tt.generation(), 0);
}

#[test]
fn tt_hashfull_counts_current_generation() {
    let tt = TranspositionTable::with_entries(4 * 250);
    assert_eq!(tt.hashfull(), 0);
    for k in 0..4000u64 {
        tt.store(k, 1, Bound::Exact, 0, None);
    }
    assert_eq!(tt.hashfull(), 1000);
    tt.new_generation();
    assert_eq!(tt.hashfull(), 0);
}

#[test]
fn tt_concurrent_readers_never_see_torn_entries() {
    let tt = Arc::new(TranspositionTable::with_entries(1 << 10));
    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let tt = Arc::clone(&tt);
            std::thread::spawn(move || {
                let mut rng = SmallRng::seed_from_u64(t);
                for _ in 0..20_000 {
                    let key: u64 = rng.gen();
                    // Score and depth are derived from the key so a mixed-up
                    // entry would show.
                    let score = (key % 1000) as i32;
                    tt.store(key, (key % 32) as i32, Bound::Exact, score, None);
                    let probe: u64 = rng.gen_range(0..u64::MAX);
                    if let Some(e) = tt.probe(probe) {
                        assert_eq!(e.key, probe);
                        assert_eq!(e.score, (probe % 1000) as i32);
                        assert_eq!(e.depth, (probe % 32) as i32);
                    }
                    if let Some(e) = tt.probe(key) {
                        assert_eq!(e.score, score);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert!(tt.len() <= tt.capacity());
}
