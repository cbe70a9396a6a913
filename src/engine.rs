//! Search orchestration: index lifecycle, candidate retrieval, filtered
//! fetch, exact re-ranking and result caching.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, QueryCache};
use crate::config::EngineConfig;
use crate::error::{Result, SearchError};
use crate::index::{IndexKey, IndexStats, LshIndex};
use crate::metrics::{CacheStats, QueryTimer, SearchMetrics};
use crate::record::{AttributeFilter, Projection, Record, RecordId, ScoredRecord};
use crate::similarity::batch_cosine_similarity;
use crate::store::{CancelToken, RecordStore};

/// How a search concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// Candidates were scored; the result list may still be short or empty.
    Ranked,
    /// The LSH index produced no candidates for the query.
    EmptyCandidateSet,
    /// Candidates existed, but none survived the fetch with a usable vector.
    NoScorableCandidates,
    /// `search_similar_to` found no vector on the source record.
    MissingSourceVector,
}

/// Outcome of a search: ranked records plus how they were obtained.
#[derive(Debug, Clone)]
pub struct SearchResults {
    /// Best first. Shared with the cache, so cloning is cheap.
    pub records: Arc<[ScoredRecord]>,
    pub status: SearchStatus,
    /// True when served from the query cache without re-scoring.
    pub cached: bool,
}

impl SearchResults {
    fn empty(status: SearchStatus) -> Self {
        Self {
            records: Arc::from(Vec::new()),
            status,
            cached: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> Vec<&RecordId> {
        self.records.iter().map(|r| &r.record.id).collect()
    }
}

/// Approximate vector search over records held in a [`RecordStore`].
///
/// One [`LshIndex`] is kept per (collection, field). Indices are built on
/// first use or explicitly with [`build_index`](Self::build_index), and are
/// never updated in place: a rebuild constructs a fresh index and swaps the
/// `Arc`, so concurrent searches see either the old or the new index in
/// full. Indices do not track store writes; call `build_index(.., true)`
/// to pick them up.
///
/// `search` may be called from many threads at once.
pub struct VectorSearchEngine<S> {
    config: EngineConfig,
    store: S,
    indices: RwLock<HashMap<IndexKey, Arc<LshIndex>>>,
    // Serializes builds so a lazily needed index is built once.
    build_lock: Mutex<()>,
    cache: QueryCache,
    metrics: SearchMetrics,
}

impl<S> fmt::Debug for VectorSearchEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorSearchEngine")
            .field("config", &self.config)
            .field("indices", &self.indices.read().keys().collect::<Vec<_>>())
            .field("cache", &self.cache)
            .finish()
    }
}

impl<S: RecordStore> VectorSearchEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache: QueryCache::new(config.cache_capacity),
            config,
            store,
            indices: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
            metrics: SearchMetrics::new(),
        })
    }

    /// An engine with [`EngineConfig::default`].
    pub fn with_defaults(store: S) -> Result<Self> {
        Self::new(store, EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ------------------------------------------------------------------
    // Index lifecycle
    // ------------------------------------------------------------------

    /// Build the index for (`collection`, `field`).
    ///
    /// No-op when the index exists and `refresh` is false.
    pub fn build_index(&self, collection: &str, field: &str, refresh: bool) -> Result<()> {
        self.build_index_with_cancel(collection, field, refresh, &CancelToken::new())
    }

    /// [`build_index`](Self::build_index) with a cancellation token checked
    /// between pages.
    pub fn build_index_with_cancel(
        &self,
        collection: &str,
        field: &str,
        refresh: bool,
        cancel: &CancelToken,
    ) -> Result<()> {
        let key = IndexKey::new(collection, field);
        let _build = self.build_lock.lock();

        if !refresh && self.indices.read().contains_key(&key) {
            debug!(index = %key, "reusing existing LSH index");
            return Ok(());
        }

        info!(index = %key, refresh, "building LSH index");
        let timer = QueryTimer::new();
        let dim = self.config.dimension;
        let mut index = LshIndex::new(self.config.index_config())?;
        let (mut missing, mut malformed) = (0usize, 0usize);

        for page in self
            .store
            .page_collection(collection, self.config.page_size, cancel)?
        {
            let page = page?;
            cancel.check()?;

            let mut batch = Vec::with_capacity(page.len());
            for record in page {
                match record.vector(field) {
                    Some(v) if v.len() == dim => batch.push((record.id, v)),
                    Some(v) => {
                        malformed += 1;
                        warn!(
                            index = %key,
                            id = %record.id,
                            expected = dim,
                            got = v.len(),
                            "skipping record with wrong vector dimension"
                        );
                    }
                    None => missing += 1,
                }
            }
            index.index_vectors(&batch)?;
        }

        let indexed = index.len();
        let (replaced, invalidated) = {
            let mut indices = self.indices.write();
            let replaced = indices.insert(key.clone(), Arc::new(index)).is_some();
            // Under the write lock, so no search can cache against the old index.
            (replaced, self.cache.invalidate(&key))
        };

        info!(
            index = %key,
            indexed,
            missing,
            malformed,
            replaced,
            invalidated,
            elapsed_ms = timer.elapsed_ns() / 1_000_000,
            "LSH index built"
        );
        Ok(())
    }

    fn ensure_index(&self, key: &IndexKey, cancel: &CancelToken) -> Result<Arc<LshIndex>> {
        if let Some(index) = self.indices.read().get(key) {
            return Ok(Arc::clone(index));
        }

        let not_built = |source: SearchError| SearchError::IndexNotBuilt {
            key: key.clone(),
            source: Box::new(source),
        };
        self.build_index_with_cancel(&key.collection, &key.field, false, cancel)
            .map_err(not_built)?;
        self.indices.read().get(key).cloned().ok_or_else(|| {
            not_built(SearchError::InvalidConfig(
                "index was dropped while it was being built".into(),
            ))
        })
    }

    /// The live index for (`collection`, `field`), if built.
    pub fn index(&self, collection: &str, field: &str) -> Option<Arc<LshIndex>> {
        self.indices
            .read()
            .get(&IndexKey::new(collection, field))
            .cloned()
    }

    pub fn index_stats(&self, collection: &str, field: &str) -> Option<IndexStats> {
        self.index(collection, field).map(|index| index.stats())
    }

    /// Keys of all live indices, sorted.
    pub fn index_keys(&self) -> Vec<IndexKey> {
        let mut keys: Vec<IndexKey> = self.indices.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Discard the index for (`collection`, `field`) together with the
    /// cached results ranked against it. The next search on it rebuilds
    /// lazily.
    pub fn drop_index(&self, collection: &str, field: &str) -> bool {
        let key = IndexKey::new(collection, field);
        let mut indices = self.indices.write();
        let removed = indices.remove(&key).is_some();
        if removed {
            let invalidated = self.cache.invalidate(&key);
            info!(index = %key, invalidated, "LSH index dropped");
        }
        removed
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// The `limit` stored vectors most similar to `query`, best first.
    ///
    /// `limit` is not part of the cache key: a cache hit returns the list
    /// stored by the first request for that key, whatever its `limit` was.
    /// Rebuilding or dropping the index evicts the results ranked against it.
    pub fn search(
        &self,
        query: &[f64],
        collection: &str,
        field: &str,
        filter: Option<&AttributeFilter>,
        limit: usize,
    ) -> Result<SearchResults> {
        self.search_with_cancel(query, collection, field, filter, limit, &CancelToken::new())
    }

    /// [`search`](Self::search) with a token that aborts store calls.
    ///
    /// A cancelled or expired token surfaces as
    /// [`SearchError::StoreUnavailable`].
    pub fn search_with_cancel(
        &self,
        query: &[f64],
        collection: &str,
        field: &str,
        filter: Option<&AttributeFilter>,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<SearchResults> {
        let dim = self.config.dimension;
        if query.len() != dim {
            return Err(SearchError::DimensionMismatch {
                expected: dim,
                got: query.len(),
            });
        }
        self.metrics.record_query();

        let cache_key = CacheKey::compute(
            query,
            self.config.cache_key_prefix_len,
            collection,
            field,
            filter,
        );
        if let Some(records) = self.cache.get(&cache_key) {
            self.metrics.record_hit();
            debug!(collection, field, key = ?cache_key, "query cache hit");
            return Ok(SearchResults {
                records,
                status: SearchStatus::Ranked,
                cached: true,
            });
        }
        self.metrics.record_miss();
        debug!(collection, field, key = ?cache_key, "query cache miss");

        let timer = QueryTimer::new();
        let index_key = IndexKey::new(collection, field);
        let index = self.ensure_index(&index_key, cancel)?;

        let candidate_ids = index.query(query)?;
        if candidate_ids.is_empty() {
            self.metrics.record_empty_candidates();
            self.metrics.record_ranking(0, timer.elapsed_ns());
            warn!(index = %index_key, "LSH query returned no candidates");
            return Ok(SearchResults::empty(SearchStatus::EmptyCandidateSet));
        }

        let filter = filter.filter(|f| !f.is_empty());
        let vector_only = Projection::field(field);
        let mut fetched =
            self.fetch(collection, &candidate_ids, filter, &vector_only, cancel)?;
        if filter.is_some() && fetched.len() < self.config.min_post_filter_candidates {
            info!(
                index = %index_key,
                candidates = candidate_ids.len(),
                matched = fetched.len(),
                "too few candidates pass the filter; retrying without it"
            );
            self.metrics.record_widened_fetch();
            fetched = self.fetch(collection, &candidate_ids, None, &vector_only, cancel)?;
        }

        let scorable = self.scorable_vectors(&index_key, fetched);
        if scorable.is_empty() {
            self.metrics
                .record_ranking(candidate_ids.len() as u64, timer.elapsed_ns());
            warn!(
                index = %index_key,
                candidates = candidate_ids.len(),
                "no fetched candidate carries a usable vector"
            );
            return Ok(SearchResults::empty(SearchStatus::NoScorableCandidates));
        }

        let mut ranked =
            batch_cosine_similarity(query, &scorable, self.config.similarity_batch_size)?;
        ranked.truncate(limit.saturating_mul(self.config.candidate_overfetch_multiplier));

        let records = self.materialize(collection, ranked, limit, cancel)?;
        {
            let indices = self.indices.read();
            if indices.get(&index_key).is_some_and(|live| Arc::ptr_eq(live, &index)) {
                self.cache.insert(cache_key, index_key, Arc::clone(&records));
            }
        }
        self.metrics
            .record_ranking(candidate_ids.len() as u64, timer.elapsed_ns());

        Ok(SearchResults {
            records,
            status: SearchStatus::Ranked,
            cached: false,
        })
    }

    /// Records similar to an existing record, excluding the record itself.
    pub fn search_similar_to(
        &self,
        collection: &str,
        field: &str,
        id: &RecordId,
        filter: Option<&AttributeFilter>,
        limit: usize,
    ) -> Result<SearchResults> {
        let cancel = CancelToken::new();
        let Some(vector) = self.store.fetch_vector(collection, id, field, &cancel)? else {
            debug!(collection, field, %id, "source record has no vector");
            return Ok(SearchResults::empty(SearchStatus::MissingSourceVector));
        };

        let results = self.search_with_cancel(
            &vector,
            collection,
            field,
            filter,
            limit.saturating_add(1),
            &cancel,
        )?;
        let records: Arc<[ScoredRecord]> = results
            .records
            .iter()
            .filter(|r| r.record.id != *id)
            .take(limit)
            .cloned()
            .collect();
        Ok(SearchResults { records, ..results })
    }

    fn fetch(
        &self,
        collection: &str,
        ids: &BTreeSet<RecordId>,
        filter: Option<&AttributeFilter>,
        projection: &Projection,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>> {
        cancel.check()?;
        let records = self
            .store
            .fetch_by_ids(collection, ids, filter, projection, cancel)?;
        // A store that ignored the token must not turn a timeout into data.
        cancel.check()?;
        Ok(records)
    }

    fn scorable_vectors(&self, key: &IndexKey, records: Vec<Record>) -> Vec<(RecordId, Vec<f64>)> {
        let dim = self.config.dimension;
        let mut scorable = Vec::with_capacity(records.len());
        for record in records {
            match record.vector(&key.field) {
                Some(v) if v.len() == dim => scorable.push((record.id, v)),
                Some(v) => warn!(
                    index = %key,
                    id = %record.id,
                    expected = dim,
                    got = v.len(),
                    "skipping candidate with wrong vector dimension"
                ),
                None => debug!(index = %key, id = %record.id, "candidate has no vector"),
            }
        }
        scorable
    }

    /// Re-fetch full records for the ranked pool and keep the best `limit`,
    /// in rank order.
    fn materialize(
        &self,
        collection: &str,
        ranked: Vec<(RecordId, f64)>,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<Arc<[ScoredRecord]>> {
        if ranked.is_empty() {
            return Ok(Arc::from(Vec::new()));
        }

        let ids: BTreeSet<RecordId> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let positions: HashMap<RecordId, (usize, f64)> = ranked
            .into_iter()
            .enumerate()
            .map(|(rank, (id, score))| (id, (rank, score)))
            .collect();

        let mut scored: Vec<(usize, ScoredRecord)> = self
            .fetch(collection, &ids, None, &Projection::All, cancel)?
            .into_iter()
            .filter_map(|record| {
                let &(rank, score) = positions.get(&record.id)?;
                Some((rank, ScoredRecord { record, score }))
            })
            .collect();
        scored.sort_by_key(|(rank, _)| *rank);

        Ok(scored.into_iter().take(limit).map(|(_, r)| r).collect())
    }

    // ------------------------------------------------------------------
    // Stats / cache
    // ------------------------------------------------------------------

    pub fn cache_stats(&self) -> CacheStats {
        let indices = self
            .index_keys()
            .into_iter()
            .filter_map(|key| {
                let len = self.indices.read().get(&key)?.len();
                Some((key, len))
            })
            .collect();
        self.metrics.snapshot(self.cache.len(), indices)
    }

    /// Drop every cached result. Counters are kept.
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("query cache cleared");
    }

    /// Reset hit/miss counters.
    pub fn reset_stats(&self) {
        self.metrics.reset();
    }
}
