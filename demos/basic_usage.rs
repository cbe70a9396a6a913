//! Basic usage of `lsh_search`.
//!
//! Loads random embeddings into the in-memory store, builds an index,
//! runs filtered and unfiltered searches, and prints cache statistics.
//!
//! Run with:
//!   RUST_LOG=lsh_search=debug cargo run --example basic_usage

use lsh_search::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const DIM: usize = 128;
const NUM_RECORDS: usize = 10_000;
const COLLECTION: &str = "video_segments";
const FIELD: &str = "embeddings.text_vector";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // ---------------------------------------------------------------
    // 1. Fill a store with random records.
    // ---------------------------------------------------------------
    println!("=== Step 1: Insert {} random records ===", NUM_RECORDS);

    let mut rng = StdRng::seed_from_u64(123);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let brands = ["acme", "globex", "initech"];

    let vectors: Vec<Vec<f64>> = (0..NUM_RECORDS)
        .map(|_| (0..DIM).map(|_| normal.sample(&mut rng)).collect())
        .collect();

    let store = InMemoryStore::new();
    for (i, v) in vectors.iter().enumerate() {
        store.insert_json(
            COLLECTION,
            format!("seg-{i:05}"),
            json!({
                "embeddings": {"text_vector": v},
                "brand": brands[i % brands.len()],
                "duration": (i % 30) as f64 + 0.5,
            }),
        );
    }
    println!("Inserted {} records.\n", store.len(COLLECTION));

    // ---------------------------------------------------------------
    // 2. Build the engine and its index.
    // ---------------------------------------------------------------
    println!("=== Step 2: Build the index ===");
    let config = EngineConfig::builder()
        .dimension(DIM)
        .bands(20)
        .rows_per_band(4)
        .seed(42)
        .build()
        .expect("invalid config");
    let engine = VectorSearchEngine::new(store, config).expect("failed to create engine");
    engine
        .build_index(COLLECTION, FIELD, false)
        .expect("index build failed");

    if let Some(stats) = engine.index_stats(COLLECTION, FIELD) {
        println!("  {}", stats);
    }
    println!();

    // ---------------------------------------------------------------
    // 3. Search with one of the stored vectors.
    // ---------------------------------------------------------------
    println!("=== Step 3: Top-5 for record #0 ===");
    let results = engine
        .search(&vectors[0], COLLECTION, FIELD, None, 5)
        .expect("search failed");
    println!("  status={:?} cached={}", results.status, results.cached);
    for (rank, hit) in results.iter().enumerate() {
        println!("  rank={} id={} score={:.6}", rank + 1, hit.record.id, hit.score);
    }
    println!();

    // ---------------------------------------------------------------
    // 4. Filtered search.
    // ---------------------------------------------------------------
    println!("=== Step 4: Top-5 for record #0, brand=acme, duration<=10 ===");
    let filter = AttributeFilter::new()
        .eq("brand", "acme")
        .range("duration", None, Some(10.0));
    let results = engine
        .search(&vectors[0], COLLECTION, FIELD, Some(&filter), 5)
        .expect("search failed");
    for hit in results.iter() {
        println!(
            "  id={} score={:.6} brand={} duration={}",
            hit.record.id,
            hit.score,
            hit.record.get("brand").unwrap_or(&json!(null)),
            hit.record.get("duration").unwrap_or(&json!(null)),
        );
    }
    println!();

    // ---------------------------------------------------------------
    // 5. Repeat a query to hit the cache.
    // ---------------------------------------------------------------
    println!("=== Step 5: Cache ===");
    let again = engine
        .search(&vectors[0], COLLECTION, FIELD, None, 5)
        .expect("search failed");
    println!("  repeated query cached: {}", again.cached);
    println!("  {}", engine.cache_stats());
    println!();

    // ---------------------------------------------------------------
    // 6. Similar to an existing record.
    // ---------------------------------------------------------------
    println!("=== Step 6: Records similar to seg-00042 ===");
    let results = engine
        .search_similar_to(COLLECTION, FIELD, &"seg-00042".into(), None, 3)
        .expect("search failed");
    for hit in results.iter() {
        println!("  id={} score={:.6}", hit.record.id, hit.score);
    }
    println!();

    // ---------------------------------------------------------------
    // 7. Tuning guidance for the configured parameters.
    // ---------------------------------------------------------------
    println!("=== Step 7: Tuning ===");
    for similarity in [0.95, 0.9, 0.8, 0.5] {
        println!(
            "  P(candidate | cos={similarity:.2}) with 20x4: {:.4}",
            estimate_recall(20, 4, similarity)
        );
    }
    let suggested = suggest_params(0.95, 0.8, 64);
    println!(
        "  For 95% recall at cos=0.80: bands={} rows={} (est. {:.4})",
        suggested.bands, suggested.rows_per_band, suggested.estimated_recall
    );

    println!("\nDone.");
}
