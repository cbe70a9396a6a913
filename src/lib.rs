//! # lsh_search
//!
//! Approximate vector similarity search over records held in an external
//! store, using banded random-hyperplane Locality-Sensitive Hashing (LSH)
//! for candidate retrieval, exact cosine re-ranking, and a bounded FIFO
//! cache of ranked results.
//!
//! ## Quick start
//!
//! ```rust
//! use lsh_search::{EngineConfig, InMemoryStore, VectorSearchEngine};
//! use serde_json::json;
//!
//! let store = InMemoryStore::new();
//! store.insert_json("docs", "a", json!({"embedding": [1.0, 0.0]}));
//! store.insert_json("docs", "b", json!({"embedding": [0.9, 0.1]}));
//! store.insert_json("docs", "c", json!({"embedding": [-1.0, 0.0]}));
//!
//! let config = EngineConfig::builder().dimension(2).seed(7).build().unwrap();
//! let engine = VectorSearchEngine::new(store, config).unwrap();
//!
//! let results = engine.search(&[1.0, 0.0], "docs", "embedding", None, 2).unwrap();
//! for hit in results.iter() {
//!     println!("id={} score={:.4}", hit.record.id, hit.score);
//! }
//! ```
//!
//! ## Feature flags
//!
//! | Flag       | Effect                                              |
//! |------------|-----------------------------------------------------|
//! | `parallel` | Bulk index signatures computed with rayon (default) |

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod index;
pub mod memory;
pub mod metrics;
pub mod record;
pub mod similarity;
pub mod store;
pub mod tuning;

// Re-exports for convenience.
pub use cache::{CacheKey, QueryCache};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{SearchResults, SearchStatus, VectorSearchEngine};
pub use error::{Result, SearchError};
pub use hash::Signature;
pub use index::{IndexConfig, IndexKey, IndexStats, LshIndex, LshIndexBuilder};
pub use memory::InMemoryStore;
pub use metrics::CacheStats;
pub use record::{AttributeFilter, Predicate, Projection, Record, RecordId, ScoredRecord, Vector};
pub use similarity::{batch_cosine_similarity, cosine_similarity};
pub use store::{CancelToken, RecordPages, RecordStore, StoreError};
pub use tuning::{collision_probability, estimate_recall, suggest_params, SuggestedParams};
