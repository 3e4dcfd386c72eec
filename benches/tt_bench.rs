use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use splitbot::search::tt::{Bound, TranspositionTable};

fn bench_tt(c: &mut Criterion) {
    let tt = TranspositionTable::new(16);
    let mut rng = SmallRng::seed_from_u64(7);
    let keys: Vec<u64> = (0..4096).map(|_| rng.gen()).collect();

    c.bench_function("tt_store_4096", |b| {
        b.iter(|| {
            for (i, &k) in keys.iter().enumerate() {
                tt.store(k, (i % 20) as i32, Bound::Exact, i as i32, None);
            }
        })
    });
    c.bench_function("tt_probe_4096", |b| {
        b.iter(|| keys.iter().filter(|&&k| tt.probe(black_box(k)).is_some()).count())
    });
}

criterion_group!(benches, bench_tt);
criterion_main!(benches);
