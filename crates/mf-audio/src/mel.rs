//! Mel filterbank construction.
//!
//! `num_filters` triangular filters with `num_filters + 2` edges spaced evenly on
//! the Mel scale between the configured low and high bounds.

use mf_core::config::PipelineConfig;
use mf_core::frame::FilterBank;

/// Hz to Mel scale conversion.
#[inline]
#[must_use]
pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Mel to Hz conversion.
#[inline]
#[must_use]
pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Spectral bin of every filter edge, `num_filters + 2` entries, non-decreasing.
///
/// `bin = floor(hz * frame_length / sample_rate)`, capped at `frame_length / 2`.
#[must_use]
pub fn edge_bins(config: &PipelineConfig) -> Vec<usize> {
    let num_edges = config.num_filters + 2;
    let max_bin = config.frame_length / 2;
    let mel_low = hz_to_mel(config.low_freq);
    let mel_high = hz_to_mel(config.effective_high_freq());
    let step = (mel_high - mel_low) / (config.num_filters + 1) as f32;
    let frame_length = config.frame_length as f32;
    let sample_rate = config.sample_rate as f32;

    (0..num_edges)
        .map(|i| {
            // Outer edges are the configured bounds, not a Mel round trip of them.
            let hz = if i == 0 {
                config.low_freq
            } else if i == num_edges - 1 {
                config.effective_high_freq()
            } else {
                mel_to_hz(mel_low + step * i as f32)
            };
            let bin = (hz * frame_length / sample_rate).floor().max(0.0) as usize;
            bin.min(max_bin)
        })
        .collect()
}

/// Build the triangular filter matrix for `config`.
///
/// Filter `i` rises 0→1 over `[bin[i], bin[i+1]]` and falls 1→0 over
/// `[bin[i+1], bin[i+2]]`. A slope of zero width contributes no weight.
///
/// # Example
/// ```
/// use mf_core::config::PipelineConfig;
/// use mf_audio::mel::build_filterbank;
///
/// let config = PipelineConfig::default();
/// let bank = build_filterbank(&config);
/// assert_eq!(bank.num_filters(), 26);
/// assert!(bank.rows().iter().all(|row| row.len() == 257));
/// ```
#[must_use]
pub fn build_filterbank(config: &PipelineConfig) -> FilterBank {
    let num_bins = config.num_bins();
    let bins = edge_bins(config);

    let rows = bins
        .windows(3)
        .map(|edges| triangle(edges[0], edges[1], edges[2], num_bins))
        .collect();

    FilterBank::from_rows(rows, num_bins)
}

fn triangle(left: usize, center: usize, right: usize, num_bins: usize) -> Vec<f32> {
    let mut row = vec![0.0f32; num_bins];

    if center > left {
        let width = (center - left) as f32;
        for (j, w) in row.iter_mut().enumerate().take(center + 1).skip(left) {
            *w = (j - left) as f32 / width;
        }
    }
    if right > center {
        let width = (right - center) as f32;
        for (j, w) in row.iter_mut().enumerate().take(right + 1).skip(center) {
            *w = (right - j) as f32 / width;
        }
    }

    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn filterbank_shape_matches_config() {
        for (frame_length, num_filters) in [(512, 26), (400, 40), (256, 10), (1024, 64)] {
            let config = PipelineConfig {
                frame_length,
                num_filters,
                num_coefficients: num_filters.min(13),
                ..PipelineConfig::default()
            };
            let bank = build_filterbank(&config);
            assert_eq!(bank.num_filters(), num_filters);
            assert_eq!(bank.num_bins(), frame_length / 2 + 1);
            assert!(bank.rows().iter().all(|r| r.len() == frame_length / 2 + 1));
        }
    }

    #[test]
    fn filters_peak_at_one_and_stay_in_unit_range() {
        let bank = build_filterbank(&PipelineConfig::default());
        for row in bank.rows() {
            let peak = row.iter().copied().fold(0.0f32, f32::max);
            assert!((peak - 1.0).abs() < 1e-6);
            assert!(row.iter().all(|&w| (0.0..=1.0).contains(&w)));
        }
    }

    #[test]
    fn weights_are_zero_outside_the_triangle() {
        let config = PipelineConfig::default();
        let bins = edge_bins(&config);
        let bank = build_filterbank(&config);
        for (i, row) in bank.rows().iter().enumerate() {
            for (j, &w) in row.iter().enumerate() {
                if j < bins[i] || j > bins[i + 2] {
                    assert_eq!(w, 0.0, "filter {i} bin {j}");
                }
            }
        }
    }

    #[test]
    fn edge_bins_are_capped_at_nyquist_bin() {
        let config = PipelineConfig::default();
        let bins = edge_bins(&config);
        assert_eq!(bins.len(), 28);
        assert_eq!(bins[0], 0);
        assert_eq!(*bins.last().unwrap(), 256);
        assert!(bins.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn degenerate_geometry_stays_finite() {
        // 16-sample frames only have 9 bins for 12 filters: edges coincide.
        let config = PipelineConfig {
            frame_length: 16,
            hop_length: 8,
            num_filters: 12,
            num_coefficients: 12,
            ..PipelineConfig::default()
        };
        let bank = build_filterbank(&config);
        assert_eq!(bank.num_filters(), 12);
        assert!(bank.rows().iter().flatten().all(|w| w.is_finite()));
    }

    #[test]
    fn band_limits_move_the_edges() {
        let config = PipelineConfig {
            low_freq: 300.0,
            high_freq: 4000.0,
            ..PipelineConfig::default()
        };
        let bins = edge_bins(&config);
        assert_eq!(bins[0], (300.0f32 * 512.0 / 16_000.0) as usize);
        assert_eq!(*bins.last().unwrap(), 128);
    }

    proptest! {
        #[test]
        fn mel_round_trip(hz in 1.0f32..22_050.0) {
            let back = mel_to_hz(hz_to_mel(hz));
            prop_assert!((back - hz).abs() <= hz * 1e-4 + 1e-3);
        }
    }
}
