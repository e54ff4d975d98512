//! Frame-batch transform seam between the pipeline and its backends.

use crate::config::PipelineConfig;
use crate::error::ProcessingError;
use crate::frame::{FeatureVector, FilterBank, Window};

/// Read-only constants handed to a [`FrameBatchTransform`] with every batch.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// Mel filter matrix.
    pub filter_bank: &'a FilterBank,
    /// Window weights.
    pub window: &'a Window,
    /// Pipeline configuration.
    pub config: &'a PipelineConfig,
}

/// Turns a batch of frames into MFCC vectors.
///
/// Given N frames (each at most `frame_length` samples; shorter frames are
/// zero-padded by the implementation), returns exactly N vectors of
/// `num_coefficients` values, or an error. Partial output is never acceptable.
///
/// The pipeline picks one implementation at construction time: the software path,
/// or an accelerated backend supplied by the caller. The pipeline owns it and
/// calls [`FrameBatchTransform::release`] exactly once on shutdown.
pub trait FrameBatchTransform: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Compute one MFCC vector per frame, in frame order.
    ///
    /// # Errors
    /// Returns a [`ProcessingError`] if any frame fails; no vectors are returned then.
    fn transform(
        &self,
        frames: &[&[f32]],
        ctx: &TransformContext<'_>,
    ) -> Result<Vec<FeatureVector>, ProcessingError>;

    /// Free backend resources. Called once by the owning pipeline.
    ///
    /// # Errors
    /// Returns an error if the backend failed to tear down cleanly.
    fn release(&mut self) -> Result<(), ProcessingError> {
        Ok(())
    }
}
