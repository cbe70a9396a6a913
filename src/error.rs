use thiserror::Error;

use crate::index::IndexKey;
use crate::store::StoreError;

/// Errors that can occur when indexing or searching vectors.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("dimension must be greater than 0")]
    ZeroDimension,

    #[error("rows_per_band must be between 1 and 64, got {0}")]
    InvalidRowsPerBand(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The lazy index build that `search` depends on did not complete.
    #[error("no index for {key}: {source}")]
    IndexNotBuilt {
        key: IndexKey,
        #[source]
        source: Box<SearchError>,
    },

    #[error("record store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl SearchError {
    /// True when the underlying cause is the record store (including a
    /// failed lazy index build caused by the store).
    pub fn is_store_failure(&self) -> bool {
        match self {
            SearchError::StoreUnavailable(_) => true,
            SearchError::IndexNotBuilt { source, .. } => source.is_store_failure(),
            _ => false,
        }
    }
}

/// A specialized Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;
