//! Pipeline configuration: defaults, validation and TOML loading.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Amplitude taper applied to each frame before the FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// 0.54 − 0.46·cos(2πn/(N−1))
    #[default]
    Hamming,
    /// 0.5·(1 − cos(2πn/(N−1)))
    Hanning,
    /// 0.42 − 0.5·cos(2πn/(N−1)) + 0.08·cos(4πn/(N−1))
    Blackman,
    /// All ones.
    Rectangular,
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hamming => "hamming",
            Self::Hanning => "hanning",
            Self::Blackman => "blackman",
            Self::Rectangular => "rectangular",
        };
        f.write_str(name)
    }
}

/// Pipeline configuration.
///
/// Immutable once a pipeline is built from it. Missing TOML keys fall back to
/// [`PipelineConfig::default`].
///
/// # Example
/// ```
/// use mf_core::config::PipelineConfig;
/// let config = PipelineConfig::default();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.num_bins(), 257);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frame length in samples (also the FFT size).
    pub frame_length: usize,
    /// Stride between consecutive frames, in samples.
    pub hop_length: usize,
    /// Number of triangular Mel filters.
    pub num_filters: usize,
    /// Number of cepstral coefficients kept per frame.
    pub num_coefficients: usize,
    /// Window applied to each frame.
    pub window: WindowKind,
    /// First-order pre-emphasis coefficient, in `[0, 1)`.
    pub pre_emphasis: f32,
    /// Lower filterbank bound in Hz.
    pub low_freq: f32,
    /// Upper filterbank bound in Hz. 0 means Nyquist.
    pub high_freq: f32,
    /// Upper bound on simultaneous frame computations; sizes the buffer pool.
    pub max_concurrency: usize,
    /// Fan frames out over the worker pool.
    pub parallel: bool,
    /// Regression half-width used by the delta passes.
    pub delta_width: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_length: 512,
            hop_length: 256,
            num_filters: 26,
            num_coefficients: 13,
            window: WindowKind::Hamming,
            pre_emphasis: 0.97,
            low_freq: 0.0,
            high_freq: 0.0,
            max_concurrency: 4,
            parallel: true,
            delta_width: 2,
        }
    }
}

impl PipelineConfig {
    /// Check every numeric constraint. Values are never clamped.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::NonPositive {
                field: "sample_rate",
            });
        }
        if self.frame_length == 0 {
            return Err(ConfigError::NonPositive {
                field: "frame_length",
            });
        }
        if self.hop_length == 0 {
            return Err(ConfigError::NonPositive {
                field: "hop_length",
            });
        }
        if self.num_coefficients == 0 {
            return Err(ConfigError::NonPositive {
                field: "num_coefficients",
            });
        }
        if self.num_filters == 0 {
            return Err(ConfigError::NonPositive {
                field: "num_filters",
            });
        }
        if !(0.0..1.0).contains(&self.pre_emphasis) {
            return Err(ConfigError::PreEmphasisOutOfRange(self.pre_emphasis));
        }
        if self.max_concurrency < 1 {
            return Err(ConfigError::Concurrency(self.max_concurrency));
        }
        if self.num_coefficients > self.num_filters {
            return Err(ConfigError::TooManyCoefficients {
                coefficients: self.num_coefficients,
                filters: self.num_filters,
            });
        }

        let nyquist = self.nyquist();
        let high = self.effective_high_freq();
        let band_ok = self.low_freq.is_finite()
            && high.is_finite()
            && self.low_freq >= 0.0
            && high <= nyquist
            && self.low_freq < high;
        if !band_ok {
            return Err(ConfigError::FrequencyBand {
                low: self.low_freq,
                high,
                nyquist,
            });
        }
        Ok(())
    }

    /// Half the sample rate.
    #[must_use]
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    /// Upper filterbank bound with 0 resolved to Nyquist.
    #[must_use]
    pub fn effective_high_freq(&self) -> f32 {
        if self.high_freq == 0.0 {
            self.nyquist()
        } else {
            self.high_freq
        }
    }

    /// Number of power-spectrum bins, `frame_length / 2 + 1`.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.frame_length / 2 + 1
    }

    /// Number of frames produced from `len` samples.
    ///
    /// Zero when the signal is shorter than one frame.
    ///
    /// # Example
    /// ```
    /// use mf_core::config::PipelineConfig;
    /// let config = PipelineConfig::default(); // 512 / 256
    /// assert_eq!(config.frame_count(512), 1);
    /// assert_eq!(config.frame_count(768), 2);
    /// assert_eq!(config.frame_count(511), 0);
    /// ```
    #[must_use]
    pub fn frame_count(&self, len: usize) -> usize {
        if len < self.frame_length || self.hop_length == 0 {
            0
        } else {
            1 + (len - self.frame_length) / self.hop_length
        }
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    /// Returns an error if the TOML is malformed or the result fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Configuration TOML invalide")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("Configuration rejetée: {}", path.display()))?;
        log::info!("Loaded {config} from {}", path.display());
        Ok(config)
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MFCC Config: SampleRate={}, FrameLength={}, HopLength={}, NumCoeffs={}, NumFilters={}, Window={}",
            self.sample_rate,
            self.frame_length,
            self.hop_length,
            self.num_coefficients,
            self.num_filters,
            self.window,
        )
    }
}
