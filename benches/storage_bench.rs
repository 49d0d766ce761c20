//! Benchmarks for kvlite storage operations

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use kvlite::store::Keyspace;
use kvlite::{Config, Engine};

fn storage_benchmarks(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .compaction_interval(Duration::from_secs(3600))
        .ttl_check_interval(Duration::from_secs(3600))
        .build();
    let engine = Engine::open(config).unwrap();

    c.bench_function("engine_set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            engine
                .set(&format!("bench:{}", i % 1024), "payload-value")
                .unwrap();
        });
    });

    engine.set("bench:hot", "payload-value").unwrap();
    c.bench_function("engine_get_hit", |b| {
        b.iter(|| black_box(engine.get("bench:hot").unwrap()));
    });

    let keyspace = Keyspace::new();
    for i in 0..10_000 {
        keyspace.set(format!("user:{i}"), "v");
    }
    c.bench_function("keyspace_keys_glob", |b| {
        b.iter(|| black_box(keyspace.keys("user:99*").len()));
    });
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
