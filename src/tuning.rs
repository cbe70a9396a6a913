use std::f64::consts::PI;

/// Suggested (bands, rows_per_band) for an index, produced by auto-tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestedParams {
    pub bands: usize,
    pub rows_per_band: usize,
    pub estimated_recall: f64,
}

/// Probability that one random hyperplane puts two vectors with cosine
/// similarity `similarity` on the same side: `1 - acos(s) / pi`.
pub fn collision_probability(similarity: f64) -> f64 {
    1.0 - similarity.clamp(-1.0, 1.0).acos() / PI
}

/// Probability that a vector with the given cosine similarity to the query
/// shares at least one band with it.
///
/// A band matches when all `rows` bits agree (`p^rows`); the candidate is
/// returned when any of `bands` bands match: `1 - (1 - p^rows)^bands`.
pub fn estimate_recall(bands: usize, rows_per_band: usize, similarity: f64) -> f64 {
    let p_band = collision_probability(similarity).powi(rows_per_band as i32);
    1.0 - (1.0 - p_band).powi(bands as i32)
}

/// Suggest LSH parameters reaching `target_recall` for neighbours at
/// cosine similarity `similarity`.
///
/// Searches rows 1..=16 and bands 1..=max_bands, preferring the most rows
/// (the smallest candidate sets) that can still hit the target, then the
/// fewest bands for that row count. Falls back to the best achievable
/// recall when the target is out of reach.
pub fn suggest_params(target_recall: f64, similarity: f64, max_bands: usize) -> SuggestedParams {
    let target_recall = target_recall.clamp(0.5, 0.999);
    let max_bands = max_bands.max(1);

    let mut best = SuggestedParams {
        bands: max_bands,
        rows_per_band: 1,
        estimated_recall: estimate_recall(max_bands, 1, similarity),
    };

    for rows in 1..=16usize {
        let Some(bands) =
            (1..=max_bands).find(|&b| estimate_recall(b, rows, similarity) >= target_recall)
        else {
            continue;
        };
        best = SuggestedParams {
            bands,
            rows_per_band: rows,
            estimated_recall: estimate_recall(bands, rows, similarity),
        };
    }

    best
}
