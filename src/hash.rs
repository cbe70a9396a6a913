use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::similarity::normalize;

/// One packed band value per band, in band order.
pub type Signature = Vec<u64>;

/// The hyperplanes of a single LSH band.
///
/// Each of the `rows` projections is a random Gaussian direction scaled to
/// unit length. A vector's band value has one bit per row: 1 when the dot
/// product with that row's projection is strictly positive. Bits are packed
/// big-endian, so row 0 lands in the most significant of the `rows` bits.
#[derive(Debug, Clone)]
pub struct BandHasher {
    projections: Vec<Array1<f64>>,
}

impl BandHasher {
    /// Draw `rows` unit projections of dimension `dim` from `rng`.
    pub fn new(dim: usize, rows: usize, rng: &mut impl Rng) -> Self {
        let projections = (0..rows)
            .map(|_| {
                let v: Vec<f64> = (0..dim).map(|_| rng.sample(StandardNormal)).collect();
                let mut arr = Array1::from_vec(v);
                normalize(&mut arr);
                arr
            })
            .collect();
        Self { projections }
    }

    /// Compute this band's value for `vector`.
    pub fn hash(&self, vector: &ArrayView1<f64>) -> u64 {
        self.projections.iter().fold(0u64, |acc, proj| {
            let bit = u64::from(vector.dot(proj) > 0.0);
            (acc << 1) | bit
        })
    }

    /// Number of hyperplanes (bits) in this band.
    pub fn rows(&self) -> usize {
        self.projections.len()
    }

    pub fn projections(&self) -> &[Array1<f64>] {
        &self.projections
    }
}

/// Hash `vector` against every band, producing its signature.
pub fn signature(bands: &[BandHasher], vector: &ArrayView1<f64>) -> Signature {
    bands.iter().map(|band| band.hash(vector)).collect()
}
