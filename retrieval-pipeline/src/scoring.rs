use crate::QueryResult;

/// Score spread below which a result set is treated as uniform.
pub const NORMALIZATION_EPSILON: f64 = 1e-4;

pub const fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Min-max scales `scores` into `[0, 1]`.
///
/// Non-finite scores are ignored when computing the range and map to `0.0`.
/// A spread under [`NORMALIZATION_EPSILON`] maps every score to `1.0`.
pub fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let mut min = f64::MAX;
    let mut max = f64::MIN;

    for s in scores {
        if !s.is_finite() {
            continue;
        }
        if *s < min {
            min = *s;
        }
        if *s > max {
            max = *s;
        }
    }

    if min > max {
        return scores.iter().map(|_| 0.0).collect();
    }

    let spread = max - min;
    if spread < NORMALIZATION_EPSILON {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|score| {
            if score.is_finite() {
                clamp_unit((score - min) / spread)
            } else {
                0.0
            }
        })
        .collect()
}

/// Normalizes one strategy's results in place, keeping the raw score as `original_score`.
///
/// Always scales from `raw_score`, so running it twice gives the same result.
pub fn normalize(results: &mut [QueryResult]) {
    let raw: Vec<f64> = results.iter().map(|r| r.raw_score).collect();
    for (result, normalized) in results.iter_mut().zip(min_max_normalize(&raw)) {
        result.original_score = Some(result.raw_score);
        result.normalized_score = Some(normalized);
    }
}
