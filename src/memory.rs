//! An in-process [`RecordStore`] backed by ordered maps.
//!
//! Useful for tests, benchmarks and small corpora. It can be switched
//! offline to exercise the engine's store-failure paths.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::record::{AttributeFilter, Projection, Record, RecordId, Vector};
use crate::store::{CancelToken, RecordPages, RecordStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<RecordId, Record>>>,
    offline: AtomicBool,
    requests: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&self, collection: &str, record: Record) {
        self.collections
            .write()
            .entry(collection.to_owned())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Insert a record given as a JSON object.
    pub fn insert_json(&self, collection: &str, id: impl Into<RecordId>, value: Value) {
        self.insert(collection, Record::from_json(id, value));
    }

    pub fn remove(&self, collection: &str, id: &RecordId) -> Option<Record> {
        self.collections.write().get_mut(collection)?.remove(id)
    }

    /// Number of records in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// When offline, every call fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Total number of store calls served or refused so far.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn admit(&self, cancel: &CancelToken) -> Result<(), StoreError> {
        cancel.check()?;
        if self.offline.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("in-memory store is offline".into()));
        }
        Ok(())
    }
}

impl RecordStore for InMemoryStore {
    fn fetch_vector(
        &self,
        collection: &str,
        id: &RecordId,
        field: &str,
        cancel: &CancelToken,
    ) -> Result<Option<Vector>, StoreError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.admit(cancel)?;
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|records| records.get(id))
            .and_then(|record| record.vector(field)))
    }

    fn page_collection<'a>(
        &'a self,
        collection: &str,
        page_size: usize,
        cancel: &'a CancelToken,
    ) -> Result<RecordPages<'a>, StoreError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.admit(cancel)?;

        let snapshot: Vec<Record> = self
            .collections
            .read()
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();

        let page_size = page_size.max(1);
        let mut remaining = snapshot.into_iter();
        let mut failed = false;
        let pages = std::iter::from_fn(move || {
            if failed {
                return None;
            }
            if let Err(e) = self.admit(cancel) {
                failed = true;
                return Some(Err(e));
            }
            let page: Vec<Record> = remaining.by_ref().take(page_size).collect();
            (!page.is_empty()).then_some(Ok(page))
        });
        Ok(Box::new(pages))
    }

    fn fetch_by_ids(
        &self,
        collection: &str,
        ids: &BTreeSet<RecordId>,
        filter: Option<&AttributeFilter>,
        projection: &Projection,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, StoreError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.admit(cancel)?;
        let collections = self.collections.read();
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id))
            .filter(|record| filter.map_or(true, |f| f.matches(record)))
            .map(|record| record.project(projection))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.insert_json(
                "items",
                format!("id{i}"),
                json!({"v": [i as f64, 1.0], "brand": if i % 2 == 0 { "even" } else { "odd" }}),
            );
        }
        store
    }

    #[test]
    fn test_pages_cover_collection() {
        let store = store();
        let cancel = CancelToken::new();
        let pages: Vec<Vec<Record>> = store
            .page_collection("items", 2, &cancel)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
    }

    #[test]
    fn test_unknown_collection_is_empty() {
        let store = store();
        let cancel = CancelToken::new();
        assert_eq!(store.page_collection("nope", 10, &cancel).unwrap().count(), 0);
    }

    #[test]
    fn test_fetch_by_ids_filters_and_projects() {
        let store = store();
        let ids: BTreeSet<RecordId> = ["id0", "id1", "id2", "missing"]
            .into_iter()
            .map(RecordId::from)
            .collect();
        let filter = AttributeFilter::new().eq("brand", "even");
        let records = store
            .fetch_by_ids(
                "items",
                &ids,
                Some(&filter),
                &Projection::field("v"),
                &CancelToken::new(),
            )
            .unwrap();
        let got: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, vec!["id0", "id2"]);
        assert!(records.iter().all(|r| !r.fields.contains_key("brand")));
    }

    #[test]
    fn test_fetch_vector() {
        let store = store();
        let cancel = CancelToken::new();
        let v = store.fetch_vector("items", &"id3".into(), "v", &cancel).unwrap();
        assert_eq!(v, Some(vec![3.0, 1.0]));
        let none = store.fetch_vector("items", &"id3".into(), "w", &cancel).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn test_offline_and_cancelled() {
        let store = store();
        let cancel = CancelToken::new();
        store.set_offline(true);
        let err = store
            .fetch_vector("items", &"id0".into(), "v", &cancel)
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        store.set_offline(false);

        cancel.cancel();
        let err = store.page_collection("items", 2, &cancel).err().unwrap();
        assert_eq!(err, StoreError::Cancelled);
    }

    #[test]
    fn test_cancel_mid_stream() {
        let store = store();
        let cancel = CancelToken::new();
        let mut pages = store.page_collection("items", 2, &cancel).unwrap();
        assert!(pages.next().unwrap().is_ok());
        cancel.cancel();
        assert_eq!(pages.next().unwrap().unwrap_err(), StoreError::Cancelled);
        assert!(pages.next().is_none());
    }
}
