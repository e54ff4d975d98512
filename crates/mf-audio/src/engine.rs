//! Single-frame MFCC pipeline.
//!
//! window → power spectrum → Mel filterbank → log → DCT-II, every stage writing
//! into buffers leased from the [`ScratchPool`]. The leases go back to the pool
//! when the computation ends, on every exit path.

use mf_core::config::PipelineConfig;
use mf_core::error::ProcessingError;
use mf_core::frame::{FeatureVector, FilterBank, FrameAnalysis, Window};

use crate::descriptors;
use crate::mel::build_filterbank;
use crate::pool::{Scratch, ScratchPool};
use crate::spectral::{
    DctTable, PowerSpectrum, apply_log, apply_mel_filters, apply_window, apply_window_padded,
};
use crate::window::build_window;

/// Read-only constants plus the scratch pool for one pipeline.
///
/// Shared by every worker thread and by streamers through an `Arc`.
pub struct FrameEngine {
    config: PipelineConfig,
    filter_bank: FilterBank,
    window: Window,
    spectrum: PowerSpectrum,
    dct: DctTable,
    pool: ScratchPool,
}

impl FrameEngine {
    /// Pre-compute filterbank, window, FFT plan, DCT basis and scratch buffers.
    ///
    /// `config` is expected to be validated already.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let filter_bank = build_filterbank(&config);
        let window = build_window(config.window, config.frame_length);
        let spectrum = PowerSpectrum::new(config.frame_length);
        let dct = DctTable::new(config.num_filters, config.num_coefficients);
        let pool = ScratchPool::new(&config, &spectrum);

        log::debug!(
            "Frame engine ready: {} filters x {} bins, {} window, pool of {}",
            filter_bank.num_filters(),
            filter_bank.num_bins(),
            window.kind(),
            pool.capacity(),
        );

        Self {
            config,
            filter_bank,
            window,
            spectrum,
            dct,
            pool,
        }
    }

    /// Pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Mel filter matrix.
    #[must_use]
    pub fn filter_bank(&self) -> &FilterBank {
        &self.filter_bank
    }

    /// Window weights.
    #[must_use]
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Scratch-buffer pool.
    #[must_use]
    pub fn pool(&self) -> &ScratchPool {
        &self.pool
    }

    /// MFCC vector for one frame. Short frames are zero-padded.
    ///
    /// # Errors
    /// Fails if the frame is longer than `frame_length`, the FFT fails, or the
    /// pool has no free scratch buffers.
    pub fn compute(&self, frame: &[f32]) -> Result<FeatureVector, ProcessingError> {
        self.compute_in(&self.pool, frame)
    }

    /// [`FrameEngine::compute`] on scratch leased from `pool` instead of the
    /// shared one. `pool` must come from [`FrameEngine::scratch_pool`].
    ///
    /// # Errors
    /// Same conditions as [`FrameEngine::compute`].
    pub fn compute_in(
        &self,
        pool: &ScratchPool,
        frame: &[f32],
    ) -> Result<FeatureVector, ProcessingError> {
        let mut scratch = pool.borrow()?;
        self.run(frame, &mut scratch)?;
        Ok(scratch.dct.to_vec())
    }

    /// A private scratch pool of `capacity` sets sized for this engine.
    #[must_use]
    pub fn scratch_pool(&self, capacity: usize) -> ScratchPool {
        ScratchPool::with_capacity(&self.config, &self.spectrum, capacity)
    }

    /// MFCC vector plus scalar descriptors for one frame.
    ///
    /// # Errors
    /// Same conditions as [`FrameEngine::compute`].
    pub fn analyze(&self, frame: &[f32]) -> Result<FrameAnalysis, ProcessingError> {
        let mut scratch = self.pool.borrow()?;
        self.run(frame, &mut scratch)?;

        let sr = self.config.sample_rate;
        let power = scratch.spectrum.power();
        Ok(FrameAnalysis {
            mfcc: scratch.dct.to_vec(),
            zcr: descriptors::zero_crossing_rate(frame),
            pitch: descriptors::pitch(frame, sr),
            spectral_centroid: descriptors::spectral_centroid(power, sr),
            spectral_rolloff: descriptors::spectral_rolloff(
                power,
                sr,
                descriptors::ROLLOFF_FRACTION,
            ),
            energy: descriptors::rms_energy(frame),
        })
    }

    fn run(&self, frame: &[f32], scratch: &mut Scratch<'_>) -> Result<(), ProcessingError> {
        if frame.len() == self.config.frame_length {
            apply_window(frame, &self.window, &mut scratch.frame)?;
        } else {
            apply_window_padded(frame, &self.window, &mut scratch.frame)?;
        }

        let power = self
            .spectrum
            .compute(&mut scratch.frame, &mut scratch.spectrum)?;
        apply_mel_filters(power, &self.filter_bank, &mut scratch.mel);
        apply_log(&scratch.mel, &mut scratch.log);
        self.dct.apply(&scratch.log, &mut scratch.dct);
        Ok(())
    }
}
