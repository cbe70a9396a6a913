use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lsh_search::{
    batch_cosine_similarity, EngineConfig, InMemoryStore, LshIndex, RecordId, VectorSearchEngine,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn generate_vectors(count: usize, dim: usize, seed: u64) -> Vec<(RecordId, Vec<f64>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let v = (0..dim).map(|_| StandardNormal.sample(&mut rng)).collect();
            (RecordId::new(format!("v{i}")), v)
        })
        .collect()
}

fn build_index(dim: usize) -> LshIndex {
    LshIndex::builder()
        .dim(dim)
        .bands(20)
        .rows_per_band(4)
        .seed(42)
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Bulk index throughput
// ---------------------------------------------------------------------------

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_vectors");

    for &dim in &[128, 1536] {
        for &n in &[1_000usize, 10_000] {
            let vecs = generate_vectors(n, dim, 99);

            group.bench_with_input(BenchmarkId::new(format!("dim={dim}"), n), &n, |b, _| {
                b.iter(|| {
                    let mut index = build_index(dim);
                    index.index_vectors(&vecs).unwrap();
                });
            });
        }
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Candidate retrieval vs. exhaustive scoring
// ---------------------------------------------------------------------------

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for &dim in &[128, 1536] {
        for &n in &[1_000usize, 10_000] {
            let vecs = generate_vectors(n, dim, 99);
            let query_vec = generate_vectors(1, dim, 1234).remove(0).1;

            let mut index = build_index(dim);
            index.index_vectors(&vecs).unwrap();

            group.bench_with_input(BenchmarkId::new(format!("lsh/dim={dim}"), n), &n, |b, _| {
                b.iter(|| index.query(&query_vec).unwrap());
            });

            group.bench_with_input(BenchmarkId::new(format!("brute/dim={dim}"), n), &n, |b, _| {
                b.iter(|| batch_cosine_similarity(&query_vec, &vecs, 100).unwrap());
            });
        }
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// End-to-end search: cold (cache cleared) and cached
// ---------------------------------------------------------------------------

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    let dim = 256;
    let n = 5_000;

    let store = Arc::new(InMemoryStore::new());
    let vecs = generate_vectors(n, dim, 7);
    for (id, v) in &vecs {
        store.insert_json("items", id.clone(), json!({"embedding": v}));
    }
    let config = EngineConfig::builder().dimension(dim).seed(42).build().unwrap();
    let engine = VectorSearchEngine::new(store, config).unwrap();
    engine.build_index("items", "embedding", false).unwrap();
    let query = &vecs[17].1;

    group.bench_function("cold", |b| {
        b.iter(|| {
            engine.clear_cache();
            engine.search(query, "items", "embedding", None, 10).unwrap()
        });
    });

    group.bench_function("cached", |b| {
        b.iter(|| engine.search(query, "items", "embedding", None, 10).unwrap());
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_index, bench_query, bench_search);
criterion_main!(benches);
