//! Temporal derivatives of a feature sequence.
//!
//! `delta[t][j] = 2 · Σ τ·x[t+τ][j] / (count · w²)` for τ in `[-w, w]`, where both
//! the sum and `count = Σ|τ|` only cover neighbours inside the sequence. Frames
//! near either end therefore use a truncated, renormalised window.
//!
//! NOTE: the usual regression delta divides by `2·Στ²`. This scale is kept as is
//! because trained downstream models expect it.

use mf_core::frame::FeatureVector;

/// First-order delta with half-width `width`.
///
/// Sequences shorter than `2·width + 1` are returned unchanged.
///
/// # Example
/// ```
/// use mf_audio::delta::compute_delta;
/// let ramp: Vec<Vec<f32>> = (0..7).map(|t| vec![t as f32]).collect();
/// let delta = compute_delta(&ramp, 2);
/// // t = 3: sum = -2*1 - 1*2 + 1*4 + 2*5 = 10, count = 6 -> 2 * 10 / (6 * 4)
/// assert!((delta[3][0] - 20.0 / 24.0).abs() < 1e-6);
/// ```
#[must_use]
#[allow(clippy::cast_possible_wrap)] // sequence lengths and widths fit isize
pub fn compute_delta(features: &[FeatureVector], width: usize) -> Vec<FeatureVector> {
    if features.len() < 2 * width + 1 {
        return features.to_vec();
    }

    let len = features.len();
    let w = width as isize;
    let w_sq = (width * width) as f32;

    features
        .iter()
        .enumerate()
        .map(|(t, current)| {
            let t = t as isize;
            (0..current.len())
                .map(|j| {
                    let mut sum = 0.0f32;
                    let mut count = 0.0f32;
                    for tau in -w..=w {
                        let idx = t + tau;
                        if idx < 0 || idx >= len as isize {
                            continue;
                        }
                        let neighbour = features[idx as usize].get(j).copied().unwrap_or(0.0);
                        sum += tau as f32 * neighbour;
                        count += tau.unsigned_abs() as f32;
                    }
                    if count > 0.0 {
                        2.0 * sum / (count * w_sq)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Second-order delta: [`compute_delta`] applied twice.
#[must_use]
pub fn compute_delta_delta(features: &[FeatureVector], width: usize) -> Vec<FeatureVector> {
    compute_delta(&compute_delta(features, width), width)
}
