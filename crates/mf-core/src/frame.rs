//! Shared data types: feature vectors, filterbank, window and result containers.

use std::fmt;

use crate::config::WindowKind;

/// MFCC output for one frame: `num_coefficients` values.
pub type FeatureVector = Vec<f32>;

/// Kinds of scratch buffer held by the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// `frame_length` samples (windowed frame, FFT input).
    Frame,
    /// FFT output, FFT scratch and power bins.
    Spectrum,
    /// `num_filters` Mel energies.
    Mel,
    /// `num_filters` log energies.
    Log,
    /// `num_coefficients` DCT outputs.
    Dct,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Frame => "frame",
            Self::Spectrum => "spectrum",
            Self::Mel => "mel",
            Self::Log => "log",
            Self::Dct => "dct",
        };
        f.write_str(name)
    }
}

/// Triangular Mel filter matrix.
///
/// Built once per pipeline and read-only afterwards. Every row has exactly
/// `num_bins` weights.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    rows: Vec<Vec<f32>>,
    num_bins: usize,
}

impl FilterBank {
    /// Wrap pre-computed rows. Rows shorter or longer than `num_bins` are resized
    /// with zeros so the row-length invariant always holds.
    #[must_use]
    pub fn from_rows(mut rows: Vec<Vec<f32>>, num_bins: usize) -> Self {
        for row in &mut rows {
            row.resize(num_bins, 0.0);
        }
        Self { rows, num_bins }
    }

    /// Filter rows, lowest frequency first.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Number of filters.
    #[must_use]
    pub fn num_filters(&self) -> usize {
        self.rows.len()
    }

    /// Length of every row, `frame_length / 2 + 1`.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Row-major copy, `num_filters * num_bins` values. Convenient for backends that
    /// upload the matrix in one piece.
    #[must_use]
    pub fn flatten(&self) -> Vec<f32> {
        self.rows.iter().flatten().copied().collect()
    }
}

/// Window weights of length `frame_length`.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    kind: WindowKind,
    weights: Vec<f32>,
}

impl Window {
    /// Wrap pre-computed weights.
    #[must_use]
    pub fn from_weights(kind: WindowKind, weights: Vec<f32>) -> Self {
        Self { kind, weights }
    }

    /// Taper shape.
    #[must_use]
    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    /// Weights, one per sample.
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Window length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// True for a zero-length window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// MFCC sequence with its first and second temporal derivatives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    /// One vector per frame.
    pub mfcc: Vec<FeatureVector>,
    /// Delta of `mfcc`.
    pub delta: Vec<FeatureVector>,
    /// Delta of `delta`.
    pub delta_delta: Vec<FeatureVector>,
}

/// MFCC plus scalar descriptors for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameAnalysis {
    /// Cepstral coefficients.
    pub mfcc: FeatureVector,
    /// Zero crossings per sample pair.
    pub zcr: f32,
    /// Autocorrelation pitch estimate in Hz, 0 when unvoiced.
    pub pitch: f32,
    /// Power-weighted mean frequency in Hz.
    pub spectral_centroid: f32,
    /// Frequency below which 85% of the power lies, in Hz.
    pub spectral_rolloff: f32,
    /// RMS energy.
    pub energy: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filterbank_rows_are_resized_to_bin_count() {
        let bank = FilterBank::from_rows(vec![vec![1.0; 3], vec![0.5; 9]], 5);
        assert_eq!(bank.num_filters(), 2);
        assert!(bank.rows().iter().all(|r| r.len() == 5));
        assert_eq!(bank.rows()[0], vec![1.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(bank.flatten().len(), 10);
    }
}
