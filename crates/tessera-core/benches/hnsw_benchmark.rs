//! HNSW Index Performance Benchmarks
//!
//! Run with: `cargo bench --bench hnsw_benchmark`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tempfile::TempDir;
use tessera_core::{DistanceMetric, HnswIndex, IndexOptions, SearchRequest, TesseraConfig};
use uuid::Uuid;

/// Generates a random-ish vector for benchmarking.
fn generate_vector(dim: usize, seed: u64) -> Vec<f32> {
    (0..dim)
        .map(|i| ((seed as f32 * 0.1 + i as f32 * 0.01).sin() + 1.0) / 2.0)
        .collect()
}

/// Benchmarks measure the graph, not the disk.
fn bench_config() -> TesseraConfig {
    let mut config = TesseraConfig::default();
    config.wal.fsync = false;
    config.snapshot.interval_secs = 0;
    config.snapshot.wal_bytes_threshold = 0;
    config.snapshot.on_close = false;
    config.compaction.enabled = false;
    config.hnsw.seed = Some(0);
    config
}

fn populated(dir: &TempDir, dim: usize, count: u64) -> HnswIndex {
    let index = HnswIndex::create(
        dir.path(),
        IndexOptions::new(dim, DistanceMetric::Cosine),
        bench_config(),
    )
    .expect("create index");
    for i in 0..count {
        index
            .insert(&generate_vector(dim, i), Uuid::new_v4())
            .expect("insert");
    }
    index
}

/// Benchmark HNSW index insertion performance, WAL append included.
fn bench_hnsw_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw_insert");
    group.sample_size(10);

    for count in [1000u64, 5000] {
        let dim = 128;
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(
            BenchmarkId::new("vectors", format!("{}x{}d", count, dim)),
            &count,
            |b, &count| {
                b.iter(|| {
                    let dir = TempDir::new().expect("tempdir");
                    let index = populated(&dir, dim, count);
                    black_box(index.len())
                });
            },
        );
    }

    group.finish();
}

/// Benchmark HNSW search latency for growing k.
fn bench_hnsw_search_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw_search_latency");

    let dim = 128;
    let dir = TempDir::new().expect("tempdir");
    let index = populated(&dir, dim, 10_000);
    let query = generate_vector(dim, 99_999);

    for k in [10usize, 50, 100] {
        let request = SearchRequest::new(k);
        group.bench_with_input(BenchmarkId::new("top_k", k), &request, |b, request| {
            b.iter(|| black_box(index.search(&query, request)));
        });
    }

    group.finish();
}

/// Benchmark the recall/latency knob.
fn bench_hnsw_search_ef(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw_search_ef");

    let dim = 128;
    let dir = TempDir::new().expect("tempdir");
    let index = populated(&dir, dim, 10_000);
    let query = generate_vector(dim, 77_777);

    for ef in [16usize, 64, 256] {
        let request = SearchRequest::new(10).with_ef(ef);
        group.bench_with_input(BenchmarkId::new("ef", ef), &request, |b, request| {
            b.iter(|| black_box(index.search(&query, request)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_hnsw_insert,
    bench_hnsw_search_latency,
    bench_hnsw_search_ef
);
criterion_main!(benches);
