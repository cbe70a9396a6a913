use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::index::IndexConfig;

/// Engine-wide options.
///
/// Every field has a default, so a partial serialized document deserializes
/// into a complete config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Vector length enforced on every query and indexed vector.
    pub dimension: usize,
    /// LSH bands per index. More bands raise recall and memory.
    pub bands: usize,
    /// Hyperplanes per band. More rows raise precision and shrink candidate sets.
    pub rows_per_band: usize,
    /// Maximum number of cached query results; 0 disables caching.
    pub cache_capacity: usize,
    /// Below this many filtered candidates, the fetch is retried without the
    /// attribute filter.
    pub min_post_filter_candidates: usize,
    /// Ranked ids kept for the final re-fetch, as a multiple of `limit`.
    pub candidate_overfetch_multiplier: usize,
    /// Records per page when streaming a collection into an index.
    pub page_size: usize,
    /// Candidates scored per chunk during re-ranking.
    pub similarity_batch_size: usize,
    /// Leading query components folded into the cache key.
    pub cache_key_prefix_len: usize,
    /// Seed for the projections of every index the engine builds.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimension: 1536,
            bands: 20,
            rows_per_band: 4,
            cache_capacity: 1000,
            min_post_filter_candidates: 5,
            candidate_overfetch_multiplier: 2,
            page_size: 100,
            similarity_batch_size: 100,
            cache_key_prefix_len: 10,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SearchError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The per-index configuration derived from these options.
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            dim: self.dimension,
            bands: self.bands,
            rows_per_band: self.rows_per_band,
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.index_config().validate()?;
        let positive = [
            ("candidate_overfetch_multiplier", self.candidate_overfetch_multiplier),
            ("page_size", self.page_size),
            ("similarity_batch_size", self.similarity_batch_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SearchError::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}

/// Fluent builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn dimension(mut self, dim: usize) -> Self {
        self.config.dimension = dim;
        self
    }

    pub fn bands(mut self, n: usize) -> Self {
        self.config.bands = n;
        self
    }

    pub fn rows_per_band(mut self, n: usize) -> Self {
        self.config.rows_per_band = n;
        self
    }

    pub fn cache_capacity(mut self, n: usize) -> Self {
        self.config.cache_capacity = n;
        self
    }

    pub fn min_post_filter_candidates(mut self, n: usize) -> Self {
        self.config.min_post_filter_candidates = n;
        self
    }

    pub fn candidate_overfetch_multiplier(mut self, n: usize) -> Self {
        self.config.candidate_overfetch_multiplier = n;
        self
    }

    pub fn page_size(mut self, n: usize) -> Self {
        self.config.page_size = n;
        self
    }

    pub fn similarity_batch_size(mut self, n: usize) -> Self {
        self.config.similarity_batch_size = n;
        self
    }

    pub fn cache_key_prefix_len(mut self, n: usize) -> Self {
        self.config.cache_key_prefix_len = n;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Validate and return the config.
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.dimension, 1536);
        assert_eq!(cfg.bands, 20);
        assert_eq!(cfg.rows_per_band, 4);
        assert_eq!(cfg.cache_capacity, 1000);
        assert_eq!(cfg.min_post_filter_candidates, 5);
        assert_eq!(cfg.candidate_overfetch_multiplier, 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let cfg = EngineConfig::from_json(r#"{"dimension": 384, "bands": 32}"#).unwrap();
        assert_eq!(cfg.dimension, 384);
        assert_eq!(cfg.bands, 32);
        assert_eq!(cfg.rows_per_band, 4);
        assert_eq!(cfg.seed, None);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            EngineConfig::builder().page_size(0).build(),
            Err(SearchError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::builder().dimension(0).build(),
            Err(SearchError::ZeroDimension)
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"rows_per_band": 80}"#),
            Err(SearchError::InvalidRowsPerBand(80))
        ));
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(SearchError::InvalidConfig(_))
        ));
    }
}
