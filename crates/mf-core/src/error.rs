//! Error taxonomy.
//!
//! [`ConfigError`] is raised only while building a pipeline. [`ProcessingError`] is
//! returned per call; batch calls never hand back partial output alongside one.

use thiserror::Error;

use crate::frame::BufferKind;

/// Rejected pipeline configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A size or rate that must be strictly positive was zero.
    #[error("{field} must be positive")]
    NonPositive {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Pre-emphasis coefficient outside `[0, 1)`.
    #[error("pre-emphasis coefficient must be in [0, 1) range, got {0}")]
    PreEmphasisOutOfRange(f32),

    /// Fewer than one concurrent frame computation allowed.
    #[error("max concurrency must be at least 1, got {0}")]
    Concurrency(usize),

    /// More cepstral coefficients requested than Mel filters available.
    #[error("requested {coefficients} coefficients but only {filters} filters are configured")]
    TooManyCoefficients {
        /// Requested coefficient count.
        coefficients: usize,
        /// Configured filter count.
        filters: usize,
    },

    /// Filterbank frequency bounds are negative, inverted or above Nyquist.
    #[error("invalid filterbank band [{low} Hz, {high} Hz] (nyquist {nyquist} Hz)")]
    FrequencyBand {
        /// Lower bound in Hz.
        low: f32,
        /// Upper bound in Hz (after resolving 0 to Nyquist).
        high: f32,
        /// Nyquist frequency of the configured sample rate.
        nyquist: f32,
    },

    /// The batch worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Failure of a single processing call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessingError {
    /// `process` was given no samples.
    #[error("empty audio input")]
    EmptyInput,

    /// `process_batch` was given no inputs.
    #[error("empty audio batch")]
    EmptyBatch,

    /// A frame of the wrong length reached the transform.
    #[error("frame length mismatch: expected {expected} samples, got {actual}")]
    FrameLength {
        /// Configured frame length.
        expected: usize,
        /// Length actually received.
        actual: usize,
    },

    /// The real FFT rejected its buffers.
    #[error("FFT failed: {0}")]
    Fft(String),

    /// More concurrent frame computations than the pool was sized for.
    #[error("{kind} buffer pool exhausted (capacity {capacity})")]
    PoolExhausted {
        /// Kind of buffer that ran out.
        kind: BufferKind,
        /// Configured pool capacity.
        capacity: usize,
    },

    /// The accelerated backend reported a failure.
    #[error("accelerator backend failed: {0}")]
    Accelerator(String),

    /// The accelerated backend returned the wrong number or shape of vectors.
    #[error("accelerator returned {actual} vectors for {expected} frames")]
    AcceleratorOutput {
        /// Number of frames submitted.
        expected: usize,
        /// Number of well-formed vectors returned.
        actual: usize,
    },

    /// A background worker could not be started.
    #[error("failed to start worker: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let err = ConfigError::NonPositive {
            field: "hop_length",
        };
        assert_eq!(err.to_string(), "hop_length must be positive");

        let err = ProcessingError::PoolExhausted {
            kind: BufferKind::Mel,
            capacity: 4,
        };
        assert_eq!(err.to_string(), "mel buffer pool exhausted (capacity 4)");
    }
}
