//! Pre-emphasis, framing and the batch execution strategies.

use std::borrow::Cow;
use std::num::NonZeroUsize;
use std::sync::Arc;

use mf_core::config::PipelineConfig;
use mf_core::error::{ConfigError, ProcessingError};
use mf_core::frame::FeatureVector;
use mf_core::traits::{FrameBatchTransform, TransformContext};
use rayon::prelude::*;

use crate::engine::FrameEngine;

/// First-order high-pass: `y[0] = x[0]`, `y[i] = x[i] - alpha * x[i-1]`.
///
/// Borrows the input unchanged when `alpha == 0`.
///
/// # Example
/// ```
/// use mf_audio::batch::pre_emphasis;
/// let y = pre_emphasis(&[1.0, 1.0, 1.0], 0.5);
/// assert_eq!(&*y, &[1.0, 0.5, 0.5]);
/// ```
#[must_use]
pub fn pre_emphasis(signal: &[f32], alpha: f32) -> Cow<'_, [f32]> {
    if alpha == 0.0 || signal.is_empty() {
        return Cow::Borrowed(signal);
    }
    let mut out = Vec::with_capacity(signal.len());
    out.push(signal[0]);
    out.extend(signal.windows(2).map(|w| w[1] - alpha * w[0]));
    Cow::Owned(out)
}

/// Split `signal` into `config.frame_count(len)` frames at `hop_length` stride.
///
/// Frames borrow from `signal`; one that runs past the end is truncated and
/// left for the frame pipeline to zero-pad.
#[must_use]
pub fn frame_signal<'a>(signal: &'a [f32], config: &PipelineConfig) -> Vec<&'a [f32]> {
    (0..config.frame_count(signal.len()))
        .map(|i| {
            let start = i * config.hop_length;
            let end = (start + config.frame_length).min(signal.len());
            &signal[start..end]
        })
        .collect()
}

/// Number of batch workers: available cores, capped by `max_concurrency`.
#[must_use]
pub fn worker_count(config: &PipelineConfig) -> usize {
    std::thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(config.max_concurrency)
        .max(1)
}

/// Runs a per-frame function over a frame list, either in order on the calling
/// thread or fanned out over a fixed worker pool in contiguous chunks.
#[derive(Clone)]
pub struct FrameExecutor {
    workers: Arc<rayon::ThreadPool>,
    num_workers: usize,
    parallel: bool,
}

impl FrameExecutor {
    /// Start the worker pool sized by [`worker_count`].
    ///
    /// # Errors
    /// Returns [`ConfigError::WorkerPool`] if the threads cannot be spawned.
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let num_workers = worker_count(config);
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|i| format!("mfcc-worker-{i}"))
            .build()
            .map_err(|e| ConfigError::WorkerPool(e.to_string()))?;
        log::debug!(
            "Frame executor: {num_workers} workers, parallel={}",
            config.parallel
        );
        Ok(Self {
            workers: Arc::new(workers),
            num_workers,
            parallel: config.parallel,
        })
    }

    /// Worker threads in the pool.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Whether frames are fanned out.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Run `op` inside the worker pool.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.workers.install(op)
    }

    /// Apply `f` to every frame, output in frame order.
    ///
    /// Both modes run on the worker pool, so however many threads call in, at
    /// most `num_workers` frames are computed at once.
    ///
    /// # Errors
    /// The first error from any frame fails the whole call.
    pub fn map<T, F>(&self, frames: &[&[f32]], f: F) -> Result<Vec<T>, ProcessingError>
    where
        T: Default + Send,
        F: Fn(&[f32]) -> Result<T, ProcessingError> + Sync,
    {
        if self.parallel && self.num_workers > 1 && frames.len() > 1 {
            self.map_parallel(frames, &f)
        } else {
            self.workers
                .install(|| frames.iter().map(|frame| f(frame)).collect())
        }
    }

    fn map_parallel<T, F>(&self, frames: &[&[f32]], f: &F) -> Result<Vec<T>, ProcessingError>
    where
        T: Default + Send,
        F: Fn(&[f32]) -> Result<T, ProcessingError> + Sync,
    {
        let chunk = frames.len().div_ceil(self.num_workers);
        let mut out: Vec<T> = std::iter::repeat_with(T::default)
            .take(frames.len())
            .collect();

        log::trace!(
            "Fanning {} frames over {} chunks of {chunk}",
            frames.len(),
            frames.len().div_ceil(chunk)
        );

        // Each chunk owns a disjoint slice of `out`.
        self.workers.install(|| {
            out.par_chunks_mut(chunk)
                .zip(frames.par_chunks(chunk))
                .try_for_each(|(slots, chunk_frames)| {
                    for (slot, frame) in slots.iter_mut().zip(chunk_frames) {
                        *slot = f(frame)?;
                    }
                    Ok::<(), ProcessingError>(())
                })
        })?;

        Ok(out)
    }
}

/// CPU implementation of the frame-batch transform.
pub struct SoftwareTransform {
    engine: Arc<FrameEngine>,
    executor: FrameExecutor,
}

impl SoftwareTransform {
    /// Wrap a shared engine and executor.
    #[must_use]
    pub fn new(engine: Arc<FrameEngine>, executor: FrameExecutor) -> Self {
        Self { engine, executor }
    }
}

impl FrameBatchTransform for SoftwareTransform {
    fn name(&self) -> &str {
        if self.executor.is_parallel() {
            "cpu-parallel"
        } else {
            "cpu-sequential"
        }
    }

    fn transform(
        &self,
        frames: &[&[f32]],
        _ctx: &TransformContext<'_>,
    ) -> Result<Vec<FeatureVector>, ProcessingError> {
        self.executor.map(frames, |frame| self.engine.compute(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn pre_emphasis_is_identity_at_zero() {
        let x = [0.1, -0.2, 0.3];
        assert!(matches!(pre_emphasis(&x, 0.0), Cow::Borrowed(_)));
        assert_eq!(&*pre_emphasis(&x, 0.0), &x);
    }

    #[test]
    fn pre_emphasis_follows_difference_equation() {
        let x = [1.0, 2.0, 4.0, 8.0];
        let y = pre_emphasis(&x, 0.97);
        assert_eq!(y[0], 1.0);
        for i in 1..x.len() {
            assert!((y[i] - (x[i] - 0.97 * x[i - 1])).abs() < 1e-6);
        }
    }

    #[test]
    fn frame_count_examples() {
        let config = PipelineConfig::default();
        assert_eq!(frame_signal(&[0.0; 512], &config).len(), 1);
        assert_eq!(frame_signal(&[0.0; 768], &config).len(), 2);
        assert!(frame_signal(&[0.0; 300], &config).is_empty());
        assert!(frame_signal(&[], &config).is_empty());
    }

    #[test]
    fn frames_start_at_hop_multiples() {
        let config = PipelineConfig {
            frame_length: 4,
            hop_length: 3,
            num_filters: 2,
            num_coefficients: 2,
            ..PipelineConfig::default()
        };
        let signal: Vec<f32> = (0..11).map(|i| i as f32).collect();
        let frames = frame_signal(&signal, &config);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(frames[1], &[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(frames[2], &[6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn worker_count_respects_max_concurrency() {
        let config = PipelineConfig {
            max_concurrency: 1,
            ..PipelineConfig::default()
        };
        assert_eq!(worker_count(&config), 1);
        assert!(worker_count(&PipelineConfig::default()) <= 4);
    }

    #[test]
    fn parallel_map_keeps_frame_order() {
        let config = PipelineConfig {
            max_concurrency: 4,
            parallel: true,
            ..PipelineConfig::default()
        };
        let executor = FrameExecutor::new(&config).unwrap();
        let signal: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let frames: Vec<&[f32]> = signal.chunks(7).collect();
        let firsts = executor.map(&frames, |f| Ok(f[0])).unwrap();
        let expected: Vec<f32> = frames.iter().map(|f| f[0]).collect();
        assert_eq!(firsts, expected);
    }

    #[test]
    fn a_failing_frame_fails_the_whole_map() {
        let config = PipelineConfig::default();
        let executor = FrameExecutor::new(&config).unwrap();
        let signal = vec![0.0f32; 64];
        let frames: Vec<&[f32]> = signal.chunks(8).collect();
        let result = executor.map(&frames, |f| {
            if f.as_ptr() == frames[5].as_ptr() {
                Err(ProcessingError::EmptyInput)
            } else {
                Ok(1u8)
            }
        });
        assert_eq!(result, Err(ProcessingError::EmptyInput));
    }

    #[test]
    fn sequential_callers_share_the_worker_cap() {
        let config = PipelineConfig {
            max_concurrency: 1,
            parallel: false,
            ..PipelineConfig::default()
        };
        let executor = FrameExecutor::new(&config).unwrap();
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let signal = vec![0.0f32; 64];
        let frames: Vec<&[f32]> = signal.chunks(8).collect();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let out = executor.map(&frames, |_| {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::yield_now();
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(1u8)
                    });
                    assert_eq!(out.unwrap().len(), 8);
                });
            }
        });
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn frame_count_formula(len in 0usize..5000, frame in 1usize..600, hop in 1usize..300) {
            let config = PipelineConfig {
                frame_length: frame,
                hop_length: hop,
                ..PipelineConfig::default()
            };
            let signal = vec![0.0; len];
            let frames = frame_signal(&signal, &config);
            let expected = if len < frame { 0 } else { 1 + (len - frame) / hop };
            prop_assert_eq!(frames.len(), expected);
            prop_assert!(frames.iter().all(|f| f.len() == frame));
        }
    }
}
