//! Scalar per-frame descriptors that complement the MFCC vector.

/// Lowest pitch searched by [`pitch`], in Hz.
pub const PITCH_MIN_HZ: f32 = 50.0;
/// Highest pitch searched by [`pitch`], in Hz.
pub const PITCH_MAX_HZ: f32 = 400.0;
/// Cumulative power fraction used by [`spectral_rolloff`].
pub const ROLLOFF_FRACTION: f32 = 0.85;

/// Sign changes per adjacent sample pair.
#[must_use]
pub fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
        .count();
    crossings as f32 / (frame.len() - 1) as f32
}

/// Root-mean-square amplitude.
#[must_use]
pub fn rms_energy(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|&x| x * x).sum();
    (sum / frame.len() as f32).sqrt()
}

/// Fundamental frequency from the strongest positive autocorrelation lag in
/// `[sr/400, sr/50]`. Returns 0 when no lag correlates positively.
#[must_use]
pub fn pitch(frame: &[f32], sample_rate: u32) -> f32 {
    let n = frame.len();
    if n < 2 {
        return 0.0;
    }
    let sr = sample_rate as f32;
    let min_lag = ((sr / PITCH_MAX_HZ) as usize).max(1);
    let max_lag = ((sr / PITCH_MIN_HZ) as usize).min(n - 1);

    let mut best = (0usize, 0.0f32);
    for lag in min_lag..=max_lag {
        let corr: f32 = frame[..n - lag]
            .iter()
            .zip(&frame[lag..])
            .map(|(&a, &b)| a * b)
            .sum();
        if corr > best.1 {
            best = (lag, corr);
        }
    }

    if best.0 == 0 { 0.0 } else { sr / best.0 as f32 }
}

#[inline(always)]
fn bin_hz(bin: usize, num_bins: usize, sample_rate: u32) -> f32 {
    bin as f32 * sample_rate as f32 / (2 * (num_bins - 1)) as f32
}

/// Power-weighted mean frequency of a one-sided power spectrum.
#[must_use]
pub fn spectral_centroid(power: &[f32], sample_rate: u32) -> f32 {
    if power.len() < 2 {
        return 0.0;
    }
    let (weighted, total) = power
        .iter()
        .enumerate()
        .fold((0.0f32, 0.0f32), |(wsum, psum), (i, &p)| {
            (wsum + bin_hz(i, power.len(), sample_rate) * p, psum + p)
        });
    if total == 0.0 { 0.0 } else { weighted / total }
}

/// Lowest frequency at which the cumulative power reaches `fraction` of the total.
#[must_use]
pub fn spectral_rolloff(power: &[f32], sample_rate: u32, fraction: f32) -> f32 {
    if power.len() < 2 {
        return 0.0;
    }
    let threshold = power.iter().sum::<f32>() * fraction;
    let mut cumulative = 0.0f32;
    for (i, &p) in power.iter().enumerate() {
        cumulative += p;
        if cumulative >= threshold {
            return bin_hz(i, power.len(), sample_rate);
        }
    }
    0.0
}
