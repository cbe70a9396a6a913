use ndarray::{Array1, ArrayView1};

use crate::error::{Result, SearchError};

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    ArrayView1::from(a).dot(&ArrayView1::from(b))
}

/// Euclidean (L2) norm.
pub fn norm(v: &[f64]) -> f64 {
    let view = ArrayView1::from(v);
    view.dot(&view).sqrt()
}

/// Normalize a vector to unit length (L2 norm). Leaves zero vectors unchanged.
pub fn normalize(v: &mut Array1<f64>) {
    let n = v.dot(v).sqrt();
    if n > 0.0 {
        *v /= n;
    }
}

fn check_dims(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(SearchError::DimensionMismatch { expected, got });
    }
    Ok(())
}

/// Cosine similarity in `[-1, 1]`.
///
/// Returns `0.0` when either vector has zero norm, so degenerate vectors
/// rank in the middle instead of producing NaN.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64> {
    check_dims(a.len(), b.len())?;
    Ok(cosine_from_parts(dot(a, b), dot(a, a), dot(b, b)))
}

// The denominator is sqrt(|a|^2 * |b|^2) rather than |a| * |b| so that
// cos(v, v) is exactly 1.0 and cos(v, -v) exactly -1.0.
fn cosine_from_parts(ab: f64, aa: f64, bb: f64) -> f64 {
    if aa == 0.0 || bb == 0.0 {
        return 0.0;
    }
    clamp_unit(ab / (aa * bb).sqrt())
}

// Rounding can push |cos| a hair past 1 for parallel vectors.
fn clamp_unit(x: f64) -> f64 {
    x.clamp(-1.0, 1.0)
}

/// Score `query` against every `(id, vector)` candidate.
///
/// Candidates are processed `batch_size` at a time; the batch size only
/// bounds the working set and never changes the output. Results are sorted
/// by descending score, with exact ties kept in input order.
pub fn batch_cosine_similarity<I, V>(
    query: &[f64],
    candidates: &[(I, V)],
    batch_size: usize,
) -> Result<Vec<(I, f64)>>
where
    I: Clone,
    V: AsRef<[f64]>,
{
    let query_view = ArrayView1::from(query);
    let query_sq = query_view.dot(&query_view);
    let mut scored = Vec::with_capacity(candidates.len());

    for batch in candidates.chunks(batch_size.max(1)) {
        for (id, vector) in batch {
            let vector = vector.as_ref();
            check_dims(query.len(), vector.len())?;
            let view = ArrayView1::from(vector);
            let score = cosine_from_parts(query_view.dot(&view), query_sq, view.dot(&view));
            scored.push((id.clone(), score));
        }
    }

    // `sort_by` is stable, which keeps tied scores in input order.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(scored)
}
