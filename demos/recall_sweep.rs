//! Recall of LSH search versus exhaustive scoring.
//!
//! Plants near-duplicates of random query vectors in a random corpus and
//! measures, for several band counts, how often the engine's top-k matches
//! the exact top-k, together with the mean candidate-set size.
//!
//! Run with:
//!   cargo run --example recall_sweep --release

use std::collections::HashSet;
use std::time::Instant;

use lsh_search::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

const N: usize = 20_000;
const DIM: usize = 256;
const NUM_QUERIES: usize = 100;
const K: usize = 10;

fn random_vector(rng: &mut StdRng, normal: &Normal<f64>) -> Vec<f64> {
    (0..DIM).map(|_| normal.sample(rng)).collect()
}

fn main() {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    println!("========================================");
    println!("  LSH recall sweep");
    println!("========================================");
    println!("  Vectors:    {}", N);
    println!("  Dimension:  {}", DIM);
    println!("  Queries:    {}", NUM_QUERIES);
    println!("  K:          {}", K);
    println!();

    let mut rng = StdRng::seed_from_u64(2024);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let jitter = Normal::new(0.0, 0.15).unwrap();

    let queries: Vec<Vec<f64>> = (0..NUM_QUERIES)
        .map(|_| random_vector(&mut rng, &normal))
        .collect();

    // Each query gets K noisy copies so that it has real neighbours.
    let mut corpus: Vec<(RecordId, Vec<f64>)> = Vec::with_capacity(N);
    for (q, query) in queries.iter().enumerate() {
        for j in 0..K {
            let v = query.iter().map(|x| x + jitter.sample(&mut rng)).collect();
            corpus.push((RecordId::new(format!("q{q}-n{j}")), v));
        }
    }
    while corpus.len() < N {
        let id = RecordId::new(format!("r{}", corpus.len()));
        corpus.push((id, random_vector(&mut rng, &normal)));
    }

    let truth: Vec<HashSet<RecordId>> = queries
        .iter()
        .map(|q| {
            batch_cosine_similarity(q, &corpus, 1_000)
                .expect("dimension mismatch")
                .into_iter()
                .take(K)
                .map(|(id, _)| id)
                .collect()
        })
        .collect();

    println!("{:>6} {:>6} {:>10} {:>14} {:>12}", "bands", "rows", "recall", "avg cands", "build ms");
    for bands in [5, 10, 20, 40] {
        let start = Instant::now();
        let mut index = LshIndex::builder()
            .dim(DIM)
            .bands(bands)
            .rows_per_band(8)
            .seed(42)
            .build()
            .expect("invalid config");
        index.index_vectors(&corpus).expect("index failed");
        let build_ms = start.elapsed().as_millis();

        let mut found = 0usize;
        let mut candidates = 0usize;
        for (q, expected) in queries.iter().zip(&truth) {
            let ids = index.query(q).expect("query failed");
            candidates += ids.len();
            let pool: Vec<(RecordId, Vec<f64>)> = corpus
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .cloned()
                .collect();
            let top = batch_cosine_similarity(q, &pool, 1_000).expect("dimension mismatch");
            found += top.iter().take(K).filter(|(id, _)| expected.contains(id)).count();
        }

        println!(
            "{:>6} {:>6} {:>10.4} {:>14.1} {:>12}",
            bands,
            8,
            found as f64 / (NUM_QUERIES * K) as f64,
            candidates as f64 / NUM_QUERIES as f64,
            build_ms,
        );
    }
}
