//! Bounded FIFO cache of ranked search results.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::index::IndexKey;
use crate::record::{AttributeFilter, ScoredRecord};

/// Digest of a search request, used as the cache key.
///
/// Only the first `prefix_len` query components are hashed, so queries that
/// agree on that prefix (and on collection, field and filter) share an
/// entry. A missing filter and an empty filter hash identically.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn compute(
        query: &[f64],
        prefix_len: usize,
        collection: &str,
        field: &str,
        filter: Option<&AttributeFilter>,
    ) -> Self {
        let mut hasher = Sha256::new();

        let prefix = &query[..prefix_len.min(query.len())];
        hasher.update((prefix.len() as u64).to_le_bytes());
        for x in prefix {
            hasher.update(x.to_bits().to_le_bytes());
        }

        for part in [collection, field] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }

        match filter.filter(|f| !f.is_empty()) {
            Some(f) => hasher.update(serde_json::to_vec(f).unwrap_or_default()),
            None => hasher.update(b"[]"),
        }

        Self(hasher.finalize().into())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey(")?;
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

struct CacheEntry {
    index: IndexKey,
    results: Arc<[ScoredRecord]>,
}

struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    // Insertion order, oldest at the front.
    order: VecDeque<CacheKey>,
}

/// A bounded map from [`CacheKey`] to ranked results.
///
/// Eviction is strict FIFO: once `capacity` entries are held, inserting a
/// new key first drops the oldest-inserted one. Lookups do not refresh an
/// entry's position. Each entry remembers the index it was ranked against
/// so a rebuilt index can drop exactly its own results. All access goes
/// through one mutex.
pub struct QueryCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<[ScoredRecord]>> {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|entry| Arc::clone(&entry.results))
    }

    /// Store `results` under `key`, returning the evicted key if any.
    ///
    /// If `key` is already present (two concurrent misses for the same
    /// request) the first stored value is kept and nothing is evicted.
    pub fn insert(
        &self,
        key: CacheKey,
        index: IndexKey,
        results: Arc<[ScoredRecord]>,
    ) -> Option<CacheKey> {
        if self.capacity == 0 {
            return None;
        }
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            return None;
        }
        let mut evicted = None;
        if inner.entries.len() >= self.capacity {
            evicted = inner.order.pop_front();
            if let Some(oldest) = &evicted {
                inner.entries.remove(oldest);
            }
        }
        inner.entries.insert(key, CacheEntry { index, results });
        inner.order.push_back(key);
        evicted
    }

    /// Drop every entry ranked against `index`, returning how many went.
    pub fn invalidate(&self, index: &IndexKey) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.index != *index);
        let CacheInner { entries, order } = &mut *inner;
        order.retain(|key| entries.contains_key(key));
        before - entries.len()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn key(i: usize) -> CacheKey {
        CacheKey::compute(&[i as f64, 0.5], 10, "c", "f", None)
    }

    fn index() -> IndexKey {
        IndexKey::new("c", "f")
    }

    fn results(score: f64) -> Arc<[ScoredRecord]> {
        vec![ScoredRecord {
            record: Record::new("r", Default::default()),
            score,
        }]
        .into()
    }

    #[test]
    fn test_fifo_eviction() {
        let cache = QueryCache::new(3);
        for i in 0..3 {
            assert_eq!(cache.insert(key(i), index(), results(i as f64)), None);
        }
        // Reading the oldest entry does not protect it.
        assert!(cache.get(&key(0)).is_some());
        assert_eq!(cache.insert(key(3), index(), results(3.0)), Some(key(0)));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&key(0)));
        for i in 1..4 {
            assert!(cache.contains(&key(i)));
        }
        assert_eq!(cache.insert(key(4), index(), results(4.0)), Some(key(1)));
    }

    #[test]
    fn test_duplicate_insert_keeps_first() {
        let cache = QueryCache::new(2);
        cache.insert(key(0), index(), results(1.0));
        assert_eq!(cache.insert(key(0), index(), results(2.0)), None);
        assert_eq!(cache.get(&key(0)).unwrap()[0].score, 1.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = QueryCache::new(0);
        cache.insert(key(0), index(), results(1.0));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = QueryCache::new(4);
        cache.insert(key(0), index(), results(1.0));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(&key(0)).is_none());
    }

    #[test]
    fn test_invalidate_is_scoped_to_index() {
        let cache = QueryCache::new(4);
        let other = IndexKey::new("c", "g");
        cache.insert(key(0), index(), results(1.0));
        cache.insert(key(1), other.clone(), results(2.0));
        cache.insert(key(2), index(), results(3.0));

        assert_eq!(cache.invalidate(&index()), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key(1)));
        assert_eq!(cache.invalidate(&index()), 0);

        // Freed slots are reusable and FIFO order still tracks survivors.
        for i in 3..6 {
            assert_eq!(cache.insert(key(i), index(), results(i as f64)), None);
        }
        assert_eq!(cache.insert(key(6), index(), results(6.0)), Some(key(1)));
        assert_eq!(cache.invalidate(&other), 0);
    }

    #[test]
    fn test_key_components() {
        let q = [0.25; 12];
        let base = CacheKey::compute(&q, 10, "c", "f", None);
        assert_eq!(base, CacheKey::compute(&q, 10, "c", "f", Some(&AttributeFilter::new())));
        assert_ne!(base, CacheKey::compute(&q, 10, "c", "g", None));
        assert_ne!(base, CacheKey::compute(&q, 10, "cf", "", None));
        let filter = AttributeFilter::new().eq("brand", "x");
        assert_ne!(base, CacheKey::compute(&q, 10, "c", "f", Some(&filter)));

        // Components past the prefix do not matter.
        let mut tail = q;
        tail[11] = 9.0;
        assert_eq!(base, CacheKey::compute(&tail, 10, "c", "f", None));
        let mut head = q;
        head[0] = 9.0;
        assert_ne!(base, CacheKey::compute(&head, 10, "c", "f", None));
    }
}
