//! Shared transposition table.
//!
//! Buckets of four entries, each bucket behind its own mutex. A reader never
//! sees a half-written entry and there is no table-wide lock.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use cozy_chess::Move;

use crate::error::{EngineError, Result};
use crate::search::{Depth, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Exact,
    Lower,
    Upper,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: u64,
    pub depth: Depth,
    pub score: Value,
    pub mv: Option<Move>,
    pub bound: Bound,
    pub gen: u8,
}

const WAYS: usize = 4;
const DEFAULT_ENTRIES: usize = 1 << 16;

#[derive(Default, Clone, Copy)]
struct Bucket {
    slots: [Option<Entry>; WAYS],
}

pub struct TranspositionTable {
    buckets: Box<[Mutex<Bucket>]>,
    gen: AtomicU8,
}

impl Default for TranspositionTable {
    fn default() -> Self { Self::with_entries(DEFAULT_ENTRIES) }
}

fn lock(b: &Mutex<Bucket>) -> MutexGuard<'_, Bucket> { b.lock().unwrap_or_else(PoisonError::into_inner) }

impl TranspositionTable {
    pub fn new(mb: usize) -> Self {
        let mut tt = Self::with_entries(WAYS);
        tt.set_capacity_mb(mb);
        tt
    }

    pub fn with_entries(entries: usize) -> Self {
        let mut tt = Self { buckets: Box::new([]), gen: AtomicU8::new(0) };
        tt.set_capacity_entries(entries);
        tt
    }

    pub const fn entry_size() -> usize { std::mem::size_of::<Option<Entry>>() }

    /// Resizes to roughly `bytes` of entries and clears the contents.
    pub fn configure(&mut self, bytes: usize) -> Result<()> {
        let entries = bytes / Self::entry_size();
        if entries < WAYS {
            return Err(EngineError::InvalidHashSize(bytes));
        }
        self.set_capacity_entries(entries);
        Ok(())
    }

    pub fn set_capacity_mb(&mut self, mb: usize) {
        let entries = (mb.saturating_mul(1024 * 1024) / Self::entry_size()).max(WAYS);
        self.set_capacity_entries(entries);
    }

    pub fn set_capacity_entries(&mut self, cap: usize) {
        let buckets = cap.max(WAYS).div_ceil(WAYS);
        self.buckets = (0..buckets).map(|_| Mutex::new(Bucket::default())).collect();
        log::debug!("transposition table: {} buckets x {} ways", buckets, WAYS);
    }

    pub fn capacity(&self) -> usize { self.buckets.len() * WAYS }

    pub fn clear(&self) {
        for b in self.buckets.iter() {
            *lock(b) = Bucket::default();
        }
        self.gen.store(0, Ordering::Relaxed);
    }

    pub fn new_generation(&self) { self.gen.fetch_add(1, Ordering::Relaxed); }

    pub fn generation(&self) -> u8 { self.gen.load(Ordering::Relaxed) }

    fn bucket(&self, key: u64) -> &Mutex<Bucket> {
        let mixed = key ^ (key >> 32);
        &self.buckets[(mixed as usize) % self.buckets.len()]
    }

    /// Looks up `key`. A hit is refreshed to the current generation so that
    /// entries still in use survive replacement.
    pub fn probe(&self, key: u64) -> Option<Entry> {
        let gen = self.generation();
        let mut g = lock(self.bucket(key));
        for e in g.slots.iter_mut().flatten() {
            if e.key == key {
                e.gen = gen;
                return Some(*e);
            }
        }
        None
    }

    /// Stores unconditionally for the same key (keeping the old move when the
    /// new one has none). Otherwise fills an empty way or evicts the entry
    /// from the oldest generation, shallowest first.
    pub fn store(&self, key: u64, depth: Depth, bound: Bound, score: Value, mv: Option<Move>) {
        let gen = self.generation();
        let mut g = lock(self.bucket(key));
        let mut e = Entry { key, depth, score, mv, bound, gen };

        for slot in g.slots.iter_mut() {
            if let Some(cur) = slot {
                if cur.key == key {
                    if e.mv.is_none() { e.mv = cur.mv; }
                    *slot = Some(e);
                    return;
                }
            }
        }
        if let Some(slot) = g.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some(e);
            return;
        }
        // Current-generation entries are kept over stale ones, then depth, then age.
        let mut victim = 0usize;
        let mut worst = (true, Depth::MAX, u8::MAX);
        for (i, slot) in g.slots.iter().enumerate() {
            if let Some(cur) = slot {
                let age = gen.wrapping_sub(cur.gen);
                let k = (cur.gen == gen, cur.depth, u8::MAX - age);
                if k < worst { worst = k; victim = i; }
            }
        }
        g.slots[victim] = Some(e);
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| lock(b).slots.iter().filter(|s| s.is_some()).count()).sum()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Permille of sampled entries written in the current generation.
    pub fn hashfull(&self) -> usize {
        let gen = self.generation();
        let sample = self.buckets.len().min(250);
        if sample == 0 { return 0; }
        let used: usize = self.buckets[..sample]
            .iter()
            .map(|b| lock(b).slots.iter().flatten().filter(|e| e.gen == gen).count())
            .sum();
        used * 1000 / (sample * WAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_rejects_tiny_tables() {
        let mut tt = TranspositionTable::default();
        assert!(matches!(tt.configure(8), Err(EngineError::InvalidHashSize(8))));
        tt.configure(1 << 20).unwrap();
        let entries = (1 << 20) / TranspositionTable::entry_size();
        assert_eq!(tt.capacity(), entries.div_ceil(WAYS) * WAYS);
    }

    #[test]
    fn same_key_keeps_old_move_when_new_has_none() {
        let tt = TranspositionTable::with_entries(4);
        let mv: Move = "e2e4".parse().unwrap();
        tt.store(7, 3, Bound::Lower, 10, Some(mv));
        tt.store(7, 1, Bound::Upper, -5, None);
        let e = tt.probe(7).unwrap();
        assert_eq!(e.mv, Some(mv));
        assert_eq!(e.depth, 1);
        assert_eq!(e.bound, Bound::Upper);
    }
}
