//! Benchmarks for directory key operations.
//!
//! Run with: `cargo bench`

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use hivedir::{Hive, HiveConfig, KeyType, KeyValue, Node, PartitionDimension};
use tempfile::tempdir;

fn bench_hive(dir: &tempfile::TempDir) -> Hive {
    let hive = Hive::create(HiveConfig {
        sync_period: Duration::ZERO,
        ..HiveConfig::new(dir.path().join("hive.db").display().to_string())
    })
    .unwrap();
    hive.add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();
    for i in 1..=4 {
        hive.add_node("user", Node::new(format!("n{}", i), format!("db://{}", i)))
            .unwrap();
    }
    hive
}

/// Benchmark primary key insertion (assigner + directory write).
fn bench_insert_primary_key(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let hive = bench_hive(&dir);
    let mut next = 0i64;

    c.bench_function("insert_primary_index_key", |b| {
        b.iter(|| {
            hive.insert_primary_index_key("user", &KeyValue::from(next)).unwrap();
            next += 1;
        });
    });
}

/// Benchmark semaphore lookup for an existing key.
fn bench_lookup_primary_key(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let hive = bench_hive(&dir);
    for key in 0..1000i64 {
        hive.insert_primary_index_key("user", &KeyValue::from(key)).unwrap();
    }

    c.bench_function("get_node_ids_of_primary_index_key", |b| {
        let mut key = 0i64;
        b.iter(|| {
            let ids = hive
                .get_node_ids_of_primary_index_key("user", &KeyValue::from(key % 1000))
                .unwrap();
            assert!(!ids.is_empty());
            key += 1;
        });
    });
}

criterion_group!(benches, bench_insert_primary_key, bench_lookup_primary_key);
criterion_main!(benches);
