use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::index::IndexKey;

/// Search and cache counters, updated with lock-free atomics.
#[derive(Debug, Default)]
pub struct SearchMetrics {
    query_count: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    empty_candidate_sets: AtomicU64,
    widened_fetches: AtomicU64,
    total_candidates: AtomicU64,
    total_miss_time_ns: AtomicU64,
}

impl SearchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_candidates(&self) {
        self.empty_candidate_sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_widened_fetch(&self) {
        self.widened_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed miss: candidate-set size and wall time.
    pub fn record_ranking(&self, candidates: u64, duration_ns: u64) {
        self.total_candidates.fetch_add(candidates, Ordering::Relaxed);
        self.total_miss_time_ns.fetch_add(duration_ns, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot. Cache and index sizes are supplied by
    /// the caller, which owns those structures.
    pub fn snapshot(&self, query_cache_size: usize, indices: Vec<(IndexKey, usize)>) -> CacheStats {
        let query_count = self.query_count.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total_candidates = self.total_candidates.load(Ordering::Relaxed);
        let total_miss_time_ns = self.total_miss_time_ns.load(Ordering::Relaxed);

        CacheStats {
            query_count,
            hits,
            misses,
            hit_rate: hits as f64 / query_count.max(1) as f64,
            empty_candidate_sets: self.empty_candidate_sets.load(Ordering::Relaxed),
            widened_fetches: self.widened_fetches.load(Ordering::Relaxed),
            avg_candidates_per_miss: if misses > 0 {
                total_candidates as f64 / misses as f64
            } else {
                0.0
            },
            avg_miss_time_us: if misses > 0 {
                total_miss_time_ns as f64 / misses as f64 / 1000.0
            } else {
                0.0
            },
            query_cache_size,
            indices,
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.query_count,
            &self.cache_hits,
            &self.cache_misses,
            &self.empty_candidate_sets,
            &self.widened_fetches,
            &self.total_candidates,
            &self.total_miss_time_ns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time snapshot of search statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub query_count: u64,
    pub hits: u64,
    pub misses: u64,
    /// `hits / query_count`, 0 before the first query.
    pub hit_rate: f64,
    pub empty_candidate_sets: u64,
    pub widened_fetches: u64,
    pub avg_candidates_per_miss: f64,
    pub avg_miss_time_us: f64,
    pub query_cache_size: usize,
    /// Vector count of every live index.
    pub indices: Vec<(IndexKey, usize)>,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Queries: {}, Hits: {}, Misses: {}, Hit rate: {:.1}%, Empty candidate sets: {}, \
             Widened: {}, Avg candidates: {:.1}, Avg miss: {:.2}us, Cached: {}, Indices: {}",
            self.query_count,
            self.hits,
            self.misses,
            self.hit_rate * 100.0,
            self.empty_candidate_sets,
            self.widened_fetches,
            self.avg_candidates_per_miss,
            self.avg_miss_time_us,
            self.query_cache_size,
            self.indices.len(),
        )
    }
}

/// Wall-clock timer for a single operation.
pub(crate) struct QueryTimer {
    start: Instant,
}

impl QueryTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}
