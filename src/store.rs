//! The boundary to the external record store.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::record::{AttributeFilter, Projection, Record, RecordId, Vector};

/// Failures reported by a [`RecordStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0}")]
    Unavailable(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out")]
    TimedOut,
}

/// Cooperative cancellation for store calls.
///
/// Clones share the same flag, so a token handed to a search can be
/// cancelled from another thread. An optional deadline turns into
/// [`StoreError::TimedOut`] once it passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// `Ok` while the operation may continue.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(StoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StoreError::TimedOut),
            _ => Ok(()),
        }
    }
}

/// Lazily produced pages of a collection. Finite, and not restartable once
/// consumption has begun.
pub type RecordPages<'a> = Box<dyn Iterator<Item = Result<Vec<Record>, StoreError>> + Send + 'a>;

/// Source of vectors and records.
///
/// Implementations should poll `cancel` while blocked and return its error
/// when triggered. Every method is a potential suspension point for the
/// engine; nothing else it does blocks.
pub trait RecordStore: Send + Sync {
    /// The vector stored at `field` on one record, or `None` if the record
    /// or the field is absent.
    fn fetch_vector(
        &self,
        collection: &str,
        id: &RecordId,
        field: &str,
        cancel: &CancelToken,
    ) -> Result<Option<Vector>, StoreError>;

    /// Stream every record of `collection`, at most `page_size` per page.
    fn page_collection<'a>(
        &'a self,
        collection: &str,
        page_size: usize,
        cancel: &'a CancelToken,
    ) -> Result<RecordPages<'a>, StoreError>;

    /// Records whose id is in `ids` and which satisfy `filter`.
    ///
    /// Unknown ids are ignored. Order of the returned records is up to the
    /// store.
    fn fetch_by_ids(
        &self,
        collection: &str,
        ids: &BTreeSet<RecordId>,
        filter: Option<&AttributeFilter>,
        projection: &Projection,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn fetch_vector(
        &self,
        collection: &str,
        id: &RecordId,
        field: &str,
        cancel: &CancelToken,
    ) -> Result<Option<Vector>, StoreError> {
        (**self).fetch_vector(collection, id, field, cancel)
    }

    fn page_collection<'a>(
        &'a self,
        collection: &str,
        page_size: usize,
        cancel: &'a CancelToken,
    ) -> Result<RecordPages<'a>, StoreError> {
        (**self).page_collection(collection, page_size, cancel)
    }

    fn fetch_by_ids(
        &self,
        collection: &str,
        ids: &BTreeSet<RecordId>,
        filter: Option<&AttributeFilter>,
        projection: &Projection,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, StoreError> {
        (**self).fetch_by_ids(collection, ids, filter, projection, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cancel_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert_eq!(token.check(), Err(StoreError::Cancelled));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_token_deadline() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert_eq!(token.check(), Err(StoreError::TimedOut));
        let later = CancelToken::with_timeout(Duration::from_secs(3600));
        assert!(later.check().is_ok());
    }
}
