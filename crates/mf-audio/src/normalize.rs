//! Per-vector z-score normalisation.

use mf_core::frame::FeatureVector;

/// Rescale every vector in place to zero mean and unit (population) variance.
///
/// A vector with zero variance becomes all zeros. Empty vectors are skipped.
pub fn normalize_frames(frames: &mut [FeatureVector]) {
    for frame in frames.iter_mut() {
        normalize(frame);
    }
}

fn normalize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    let std = variance.sqrt();

    if std <= f32::EPSILON {
        values.fill(0.0);
    } else {
        for v in values.iter_mut() {
            *v = (*v - mean) / std;
        }
    }
}
