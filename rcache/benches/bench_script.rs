use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rcache::{fingerprint, Cache, ScriptDefinition};
use rcache_test::MemoryStore;

fn bench_fingerprint(c: &mut Criterion) {
    let source = ScriptDefinition::new("bench", "return redis.call('incr', KEYS[1])");

    c.bench_function("fingerprint", |b| {
        b.iter(|| fingerprint(black_box(source.source())))
    });
}

fn bench_atomic_operations(c: &mut Criterion) {
    let mut cache = Cache::new(MemoryStore::new());
    let mut group = c.benchmark_group("atomic_operation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("incr", |b| {
        b.iter(|| {
            let _: i64 = cache
                .execute_atomic_operation_as("incr", black_box("bench:incr"), 60)
                .unwrap();
        })
    });

    group.bench_function("incr_max", |b| {
        b.iter(|| {
            let _: Vec<i64> = cache
                .execute_atomic_operation_as("incr_max", black_box("bench:max"), (1000, 60))
                .unwrap();
        })
    });

    group.bench_function("reload_after_flush", |b| {
        let store = MemoryStore::new();
        let mut cache = Cache::new(store.clone());
        b.iter(|| {
            store.flush_script_cache();
            let _: i64 = cache
                .execute_atomic_operation_as("incr", black_box("bench:reload"), 60)
                .unwrap();
        })
    });

    group.finish();
}

fn bench_mset(c: &mut Criterion) {
    let mut cache = Cache::new(MemoryStore::new());
    let entries: Vec<(String, String)> = (0..100)
        .map(|i| (format!("bench:key:{i}"), format!("value:{i}")))
        .collect();

    let mut group = c.benchmark_group("mset");
    group.throughput(Throughput::Elements(entries.len() as u64));

    group.bench_function("without_ttl", |b| {
        b.iter(|| cache.mset(entries.clone(), Duration::ZERO).unwrap())
    });

    group.bench_function("with_ttl", |b| {
        b.iter(|| cache.mset(entries.clone(), Duration::from_secs(60)).unwrap())
    });

    group.finish();
}

criterion_group!(bench, bench_fingerprint, bench_atomic_operations, bench_mset);
criterion_main!(bench);
