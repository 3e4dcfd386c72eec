use criterion::{black_box, criterion_group, criterion_main, Criterion};
use splitbot::{EngineConfig, Limits, Position, ThreadPool};

const MIDDLEGAME: &str = "r1bq1rk1/pp2bppp/2n1pn2/3p4/2PP4/2N1PN2/PP1B1PPP/R2QKB1R w KQ - 0 8";

fn bench_search(c: &mut Criterion) {
    let pos = Position::from_fen(MIDDLEGAME).unwrap();
    let mut group = c.benchmark_group("search_depth_6");
    group.sample_size(10);
    for threads in [1, 2, 4] {
        let config = EngineConfig { threads, hash_mb: 16, ..EngineConfig::default() };
        let pool = ThreadPool::init(&config).unwrap();
        group.bench_function(format!("{threads}_threads"), |b| {
            b.iter(|| {
                pool.clear_hash();
                let r = pool.search(black_box(&pos), Limits::depth(6)).unwrap();
                black_box(r.nodes)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
