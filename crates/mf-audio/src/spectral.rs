//! Per-frame spectral stages: window, power spectrum, Mel aggregation, log
//! compression and DCT-II.
//!
//! Every stage writes into a caller-provided buffer. No stage allocates.

use std::f64::consts::PI;
use std::sync::Arc;

use mf_core::error::ProcessingError;
use mf_core::frame::{FilterBank, Window};
use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};

/// Guard added before the logarithm so silent bands stay finite.
pub const LOG_EPSILON: f32 = 1e-6;

/// Multiply `frame` by `window` into `out`.
///
/// # Errors
/// Returns [`ProcessingError::FrameLength`] if the three lengths differ.
///
/// # Example
/// ```
/// use mf_core::config::WindowKind;
/// use mf_core::frame::Window;
/// use mf_audio::spectral::apply_window;
///
/// let window = Window::from_weights(WindowKind::Rectangular, vec![0.5, 1.0]);
/// let mut out = [0.0; 2];
/// apply_window(&[2.0, 3.0], &window, &mut out).unwrap();
/// assert_eq!(out, [1.0, 3.0]);
/// ```
pub fn apply_window(frame: &[f32], window: &Window, out: &mut [f32]) -> Result<(), ProcessingError> {
    let weights = window.weights();
    if frame.len() != weights.len() || out.len() != weights.len() {
        return Err(ProcessingError::FrameLength {
            expected: weights.len(),
            actual: frame.len(),
        });
    }
    for ((o, &x), &w) in out.iter_mut().zip(frame).zip(weights) {
        *o = x * w;
    }
    Ok(())
}

/// Copy a short `frame` into `out`, zero-fill the tail and apply the window.
///
/// # Errors
/// Returns [`ProcessingError::FrameLength`] if `frame` is longer than the window.
pub fn apply_window_padded(
    frame: &[f32],
    window: &Window,
    out: &mut [f32],
) -> Result<(), ProcessingError> {
    let weights = window.weights();
    if frame.len() > weights.len() || out.len() != weights.len() {
        return Err(ProcessingError::FrameLength {
            expected: weights.len(),
            actual: frame.len(),
        });
    }
    let (head, tail) = out.split_at_mut(frame.len());
    for ((o, &x), &w) in head.iter_mut().zip(frame).zip(weights) {
        *o = x * w;
    }
    tail.fill(0.0);
    Ok(())
}

/// FFT output, FFT scratch and power bins for one frame computation.
#[derive(Debug, Clone, Default)]
pub struct SpectralWorkspace {
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    power: Vec<f32>,
}

impl SpectralWorkspace {
    /// Power bins written by the last [`PowerSpectrum::compute`].
    #[must_use]
    pub fn power(&self) -> &[f32] {
        &self.power
    }
}

/// Real-input FFT power spectrum, planned once for a fixed frame length.
///
/// Input: windowed real frame of length N. Output: N/2+1 values `re² + im²`.
pub struct PowerSpectrum {
    fft: Arc<dyn RealToComplex<f32>>,
    frame_length: usize,
}

impl PowerSpectrum {
    /// Plan the forward transform.
    #[must_use]
    pub fn new(frame_length: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_length);
        Self { fft, frame_length }
    }

    /// Number of output bins.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.frame_length / 2 + 1
    }

    /// Allocate a workspace sized for this plan.
    #[must_use]
    pub fn workspace(&self) -> SpectralWorkspace {
        SpectralWorkspace {
            spectrum: self.fft.make_output_vec(),
            scratch: self.fft.make_scratch_vec(),
            power: vec![0.0; self.num_bins()],
        }
    }

    /// Transform `windowed` (used as FFT scratch, its contents are clobbered) and
    /// return the power bins held in `ws`.
    ///
    /// # Errors
    /// Returns an error if `windowed` has the wrong length or the FFT rejects the
    /// workspace.
    pub fn compute<'w>(
        &self,
        windowed: &mut [f32],
        ws: &'w mut SpectralWorkspace,
    ) -> Result<&'w [f32], ProcessingError> {
        if windowed.len() != self.frame_length {
            return Err(ProcessingError::FrameLength {
                expected: self.frame_length,
                actual: windowed.len(),
            });
        }
        self.fft
            .process_with_scratch(windowed, &mut ws.spectrum, &mut ws.scratch)
            .map_err(|e| ProcessingError::Fft(e.to_string()))?;

        for (p, c) in ws.power.iter_mut().zip(&ws.spectrum) {
            *p = c.re * c.re + c.im * c.im;
        }
        Ok(&ws.power)
    }
}

/// Dot each filter with the power spectrum into `out`.
///
/// Bins past the end of `power` count as zero.
#[inline]
pub fn apply_mel_filters(power: &[f32], bank: &FilterBank, out: &mut [f32]) {
    for (o, row) in out.iter_mut().zip(bank.rows()) {
        *o = row.iter().zip(power).map(|(&w, &p)| w * p).sum();
    }
}

/// `ln(v + 1e-6)` elementwise.
#[inline]
pub fn apply_log(values: &[f32], out: &mut [f32]) {
    for (o, &v) in out.iter_mut().zip(values) {
        *o = (v + LOG_EPSILON).ln();
    }
}

/// Orthonormal DCT-II basis, truncated to the first `num_coefficients` rows.
///
/// Row `k` holds `cos(π·k·(m+0.5)/M)` scaled by `sqrt(1/M)` for k=0 and
/// `sqrt(2/M)` otherwise.
#[derive(Debug, Clone)]
pub struct DctTable {
    basis: Vec<Vec<f32>>,
}

impl DctTable {
    /// Pre-compute the basis for `num_inputs` (M) log energies.
    #[must_use]
    pub fn new(num_inputs: usize, num_coefficients: usize) -> Self {
        let m = num_inputs.max(1) as f64;
        let basis = (0..num_coefficients)
            .map(|k| {
                let scale = if k == 0 { (1.0 / m).sqrt() } else { (2.0 / m).sqrt() };
                (0..num_inputs)
                    .map(|n| (scale * (PI * k as f64 * (n as f64 + 0.5) / m).cos()) as f32)
                    .collect()
            })
            .collect();
        Self { basis }
    }

    /// Number of coefficients produced.
    #[must_use]
    pub fn num_coefficients(&self) -> usize {
        self.basis.len()
    }

    /// Transform `input` into `out`.
    #[inline]
    pub fn apply(&self, input: &[f32], out: &mut [f32]) {
        for (o, row) in out.iter_mut().zip(&self.basis) {
            *o = row.iter().zip(input).map(|(&b, &x)| b * x).sum();
        }
    }
}
