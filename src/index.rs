use std::collections::BTreeSet;
use std::fmt;

use hashbrown::{HashMap, HashSet};
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::hash::{self, BandHasher, Signature};
use crate::record::RecordId;

/// Configuration for one LSH index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Dimensionality of every indexed and queried vector.
    pub dim: usize,
    /// Number of bands (independent hash tables).
    pub bands: usize,
    /// Hyperplanes per band (1..=64); each band value is this many bits.
    pub rows_per_band: usize,
    /// Optional RNG seed for reproducible projections.
    pub seed: Option<u64>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dim: 1536,
            bands: 20,
            rows_per_band: 4,
            seed: None,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(SearchError::ZeroDimension);
        }
        if self.rows_per_band == 0 || self.rows_per_band > 64 {
            return Err(SearchError::InvalidRowsPerBand(self.rows_per_band));
        }
        if self.bands == 0 {
            return Err(SearchError::InvalidConfig("bands must be > 0".into()));
        }
        Ok(())
    }
}

/// Identifies an index: one per (collection, vector field) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    pub collection: String,
    pub field: String,
}

impl IndexKey {
    pub fn new(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.field)
    }
}

/// Aggregate statistics about the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub num_vectors: usize,
    pub bands: usize,
    pub rows_per_band: usize,
    pub dimension: usize,
    pub total_buckets: usize,
    pub avg_bucket_size: f64,
    pub max_bucket_size: usize,
    pub memory_estimate_bytes: usize,
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LshIndex {{ vectors: {}, bands: {}, rows/band: {}, dim: {}, \
             buckets: {}, avg_bucket: {:.1}, max_bucket: {}, mem: ~{:.1}MB }}",
            self.num_vectors,
            self.bands,
            self.rows_per_band,
            self.dimension,
            self.total_buckets,
            self.avg_bucket_size,
            self.max_bucket_size,
            self.memory_estimate_bytes as f64 / (1024.0 * 1024.0),
        )
    }
}

/// A banded random-hyperplane LSH index over fixed-dimension vectors.
///
/// The index stores only signatures and bucket membership, never the vectors
/// themselves; exact scoring happens against vectors fetched from the store.
/// Projections are drawn once at construction, band by band from a single
/// RNG stream, and never change afterwards.
///
/// Mutation needs `&mut self`. Share a finished index behind an `Arc` and
/// replace it wholesale to pick up new data.
#[derive(Debug, Clone)]
pub struct LshIndex {
    config: IndexConfig,
    bands: Vec<BandHasher>,
    tables: Vec<HashMap<u64, HashSet<RecordId>>>,
    signatures: HashMap<RecordId, Signature>,
}

impl LshIndex {
    /// Start building an index with the builder pattern.
    pub fn builder() -> LshIndexBuilder {
        LshIndexBuilder::new()
    }

    /// Create an empty index from an [`IndexConfig`].
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let bands = (0..config.bands)
            .map(|_| BandHasher::new(config.dim, config.rows_per_band, &mut rng))
            .collect();
        let tables = (0..config.bands).map(|_| HashMap::new()).collect();

        Ok(Self {
            config,
            bands,
            tables,
            signatures: HashMap::new(),
        })
    }

    fn check_dim(&self, vector: &[f64]) -> Result<()> {
        if vector.len() != self.config.dim {
            return Err(SearchError::DimensionMismatch {
                expected: self.config.dim,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Compute the band signature of `vector`.
    pub fn hash_vector(&self, vector: &[f64]) -> Result<Signature> {
        self.check_dim(vector)?;
        Ok(hash::signature(&self.bands, &ArrayView1::from(vector)))
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Index one vector under `id`.
    ///
    /// Re-indexing an existing id replaces its previous bucket entries.
    pub fn index_vector(&mut self, id: RecordId, vector: &[f64]) -> Result<()> {
        let signature = self.hash_vector(vector)?;
        self.apply(id, signature);
        Ok(())
    }

    /// Index many vectors at once.
    ///
    /// All dimensions are checked before anything is inserted, so a
    /// mismatch leaves the index untouched. Signatures are computed up front
    /// (in parallel with the `parallel` feature) and then merged band by
    /// band.
    pub fn index_vectors<V>(&mut self, pairs: &[(RecordId, V)]) -> Result<()>
    where
        V: AsRef<[f64]> + Sync,
    {
        for (_, v) in pairs {
            self.check_dim(v.as_ref())?;
        }

        let signatures = self.batch_signatures(pairs);
        for ((id, _), signature) in pairs.iter().zip(signatures) {
            self.apply(id.clone(), signature);
        }
        Ok(())
    }

    #[cfg(feature = "parallel")]
    fn batch_signatures<V: AsRef<[f64]> + Sync>(&self, pairs: &[(RecordId, V)]) -> Vec<Signature> {
        use rayon::prelude::*;

        pairs
            .par_iter()
            .map(|(_, v)| hash::signature(&self.bands, &ArrayView1::from(v.as_ref())))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn batch_signatures<V: AsRef<[f64]> + Sync>(&self, pairs: &[(RecordId, V)]) -> Vec<Signature> {
        pairs
            .iter()
            .map(|(_, v)| hash::signature(&self.bands, &ArrayView1::from(v.as_ref())))
            .collect()
    }

    fn apply(&mut self, id: RecordId, signature: Signature) {
        if let Some(old) = self.signatures.get(&id) {
            if *old == signature {
                return;
            }
            let old = old.clone();
            self.unlink(&id, &old);
        }
        for (table, value) in self.tables.iter_mut().zip(&signature) {
            table.entry(*value).or_default().insert(id.clone());
        }
        self.signatures.insert(id, signature);
    }

    fn unlink(&mut self, id: &RecordId, signature: &Signature) {
        for (table, value) in self.tables.iter_mut().zip(signature) {
            if let Some(bucket) = table.get_mut(value) {
                bucket.remove(id);
                if bucket.is_empty() {
                    table.remove(value);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    /// Candidate ids for `vector`: the union over all bands of the ids whose
    /// band value matches. No quorum is applied, so a single shared band is
    /// enough.
    pub fn query(&self, vector: &[f64]) -> Result<BTreeSet<RecordId>> {
        let signature = self.hash_vector(vector)?;
        let mut candidates = BTreeSet::new();
        for (table, value) in self.tables.iter().zip(&signature) {
            if let Some(bucket) = table.get(value) {
                candidates.extend(bucket.iter().cloned());
            }
        }
        Ok(candidates)
    }

    // ------------------------------------------------------------------
    // Removal / lookup
    // ------------------------------------------------------------------

    /// Remove `id` from every band. Returns whether it was present.
    pub fn remove(&mut self, id: &RecordId) -> bool {
        match self.signatures.remove(id) {
            Some(signature) => {
                self.unlink(id, &signature);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.signatures.contains_key(id)
    }

    /// Number of indexed ids.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    /// Compute aggregate statistics about the index.
    pub fn stats(&self) -> IndexStats {
        let total_buckets: usize = self.tables.iter().map(|t| t.len()).sum();
        let bucket_sizes = || self.tables.iter().flat_map(|t| t.values()).map(|b| b.len());
        let total_entries: usize = bucket_sizes().sum();
        let max_bucket_size = bucket_sizes().max().unwrap_or(0);

        let avg_bucket_size = if total_buckets > 0 {
            total_entries as f64 / total_buckets as f64
        } else {
            0.0
        };

        let id_bytes: usize = self.signatures.keys().map(|id| id.as_str().len()).sum();
        let signature_mem = self.signatures.len() * self.config.bands * 8 + id_bytes;
        let table_mem = total_buckets * (std::mem::size_of::<u64>() + 48);
        let entry_mem = total_entries * std::mem::size_of::<RecordId>() + id_bytes * self.config.bands;
        let proj_mem = self.config.bands * self.config.rows_per_band * self.config.dim * 8;

        IndexStats {
            num_vectors: self.signatures.len(),
            bands: self.config.bands,
            rows_per_band: self.config.rows_per_band,
            dimension: self.config.dim,
            total_buckets,
            avg_bucket_size,
            max_bucket_size,
            memory_estimate_bytes: signature_mem + table_mem + entry_mem + proj_mem,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Fluent builder for [`LshIndex`].
#[derive(Debug, Default)]
pub struct LshIndexBuilder {
    config: IndexConfig,
}

impl LshIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dim(mut self, dim: usize) -> Self {
        self.config.dim = dim;
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

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the index, returning an error on invalid configuration.
    pub fn build(self) -> Result<LshIndex> {
        LshIndex::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(dim: usize, bands: usize, rows: usize) -> LshIndex {
        LshIndex::builder()
            .dim(dim)
            .bands(bands)
            .rows_per_band(rows)
            .seed(42)
            .build()
            .unwrap()
    }

    #[test]
    fn test_signature_shape_and_determinism() {
        let idx = index(8, 5, 3);
        let v: Vec<f64> = (0..8).map(|i| i as f64 - 3.5).collect();
        let s1 = idx.hash_vector(&v).unwrap();
        let s2 = idx.hash_vector(&v).unwrap();
        assert_eq!(s1.len(), 5);
        assert_eq!(s1, s2);
        assert!(s1.iter().all(|&b| b < 8));
    }

    #[test]
    fn test_same_seed_same_projections() {
        let a = index(16, 4, 4);
        let b = index(16, 4, 4);
        let v: Vec<f64> = (0..16).map(|i| (i as f64).cos()).collect();
        assert_eq!(a.hash_vector(&v).unwrap(), b.hash_vector(&v).unwrap());
    }

    #[test]
    fn test_reindex_replaces_buckets() {
        let mut idx = index(2, 8, 2);
        let id = RecordId::from("a");
        idx.index_vector(id.clone(), &[1.0, 0.0]).unwrap();
        idx.index_vector(id.clone(), &[-1.0, 0.0]).unwrap();
        assert_eq!(idx.len(), 1);
        assert!(idx.query(&[-1.0, 0.0]).unwrap().contains(&id));
        assert!(!idx.query(&[1.0, 0.0]).unwrap().contains(&id));
    }

    #[test]
    fn test_remove() {
        let mut idx = index(2, 4, 2);
        let id = RecordId::from("a");
        idx.index_vector(id.clone(), &[1.0, 0.5]).unwrap();
        assert!(idx.remove(&id));
        assert!(!idx.remove(&id));
        assert!(idx.is_empty());
        assert_eq!(idx.stats().total_buckets, 0);
        assert!(idx.query(&[1.0, 0.5]).unwrap().is_empty());
    }

    #[test]
    fn test_bulk_mismatch_leaves_index_untouched() {
        let mut idx = index(3, 4, 2);
        let pairs = vec![
            (RecordId::from("ok"), vec![1.0, 0.0, 0.0]),
            (RecordId::from("bad"), vec![1.0, 0.0]),
        ];
        let err = idx.index_vectors(&pairs).unwrap_err();
        assert!(matches!(
            err,
            SearchError::DimensionMismatch { expected: 3, got: 2 }
        ));
        assert!(idx.is_empty());
    }

    #[test]
    fn test_bulk_matches_incremental() {
        let pairs: Vec<(RecordId, Vec<f64>)> = (0..50)
            .map(|i| {
                let x = i as f64 * 0.37;
                (RecordId::new(format!("r{i}")), vec![x.sin(), x.cos(), (2.0 * x).sin()])
            })
            .collect();
        let mut bulk = index(3, 10, 3);
        bulk.index_vectors(&pairs).unwrap();
        let mut single = index(3, 10, 3);
        for (id, v) in &pairs {
            single.index_vector(id.clone(), v).unwrap();
        }
        for (_, v) in &pairs {
            assert_eq!(bulk.query(v).unwrap(), single.query(v).unwrap());
        }
        assert_eq!(bulk.stats(), single.stats());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            LshIndex::builder().dim(0).build().unwrap_err(),
            SearchError::ZeroDimension
        ));
        assert!(matches!(
            LshIndex::builder().dim(4).rows_per_band(65).build().unwrap_err(),
            SearchError::InvalidRowsPerBand(65)
        ));
        assert!(matches!(
            LshIndex::builder().dim(4).rows_per_band(0).build().unwrap_err(),
            SearchError::InvalidRowsPerBand(0)
        ));
        assert!(matches!(
            LshIndex::builder().dim(4).bands(0).build().unwrap_err(),
            SearchError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_default_config() {
        let cfg = IndexConfig::default();
        assert_eq!((cfg.dim, cfg.bands, cfg.rows_per_band), (1536, 20, 4));
    }

    #[test]
    fn test_index_key_display() {
        let key = IndexKey::new("video_segments", "embeddings.text_vector");
        assert_eq!(key.to_string(), "video_segments/embeddings.text_vector");
    }
}
