//! Public entry point: one configured MFCC pipeline.
//!
//! A [`Pipeline`] owns the shared [`FrameEngine`], the batch worker pool and the
//! frame-batch backend chosen at construction. The backend is released exactly
//! once, by [`Pipeline::release`] or on drop.

use std::sync::Arc;

use mf_core::config::PipelineConfig;
use mf_core::error::{ConfigError, ProcessingError};
use mf_core::frame::{FeatureSet, FeatureVector, FilterBank, FrameAnalysis, Window};
use mf_core::traits::{FrameBatchTransform, TransformContext};
use rayon::prelude::*;

use crate::batch::{FrameExecutor, SoftwareTransform, frame_signal, pre_emphasis};
use crate::delta::compute_delta;
use crate::engine::FrameEngine;
use crate::stream::Streamer;

/// Configured MFCC extractor.
///
/// # Example
/// ```
/// use mf_core::config::PipelineConfig;
/// use mf_audio::Pipeline;
///
/// let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
/// let features = pipeline.process(&vec![0.1; 768]).unwrap();
/// assert_eq!(features.len(), 2);
/// assert_eq!(features[0].len(), 13);
/// pipeline.release().unwrap();
/// ```
pub struct Pipeline {
    engine: Arc<FrameEngine>,
    executor: FrameExecutor,
    backend: Box<dyn FrameBatchTransform>,
    released: bool,
}

impl Pipeline {
    /// Build a pipeline running on the CPU.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if `config` is invalid or the worker pool
    /// cannot be started.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        Self::build(config, |engine, executor| {
            let software = SoftwareTransform::new(Arc::clone(engine), executor.clone());
            Box::new(software) as Box<dyn FrameBatchTransform>
        })
    }

    /// Build a pipeline whose frame batches go through `backend`.
    ///
    /// The pipeline takes ownership and releases the backend on shutdown.
    ///
    /// # Errors
    /// Same as [`Pipeline::new`].
    pub fn with_accelerator(
        config: PipelineConfig,
        backend: Box<dyn FrameBatchTransform>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, |_, _| backend)
    }

    fn build(
        config: PipelineConfig,
        make_backend: impl FnOnce(&Arc<FrameEngine>, &FrameExecutor) -> Box<dyn FrameBatchTransform>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let executor = FrameExecutor::new(&config)?;
        log::info!("{config}");

        let engine = Arc::new(FrameEngine::new(config));
        let backend = make_backend(&engine, &executor);
        log::info!(
            "Pipeline ready: backend {}, {} workers",
            backend.name(),
            executor.num_workers()
        );

        Ok(Self {
            engine,
            executor,
            backend,
            released: false,
        })
    }

    /// Configuration the pipeline was built with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        self.engine.config()
    }

    /// Mel filter matrix.
    #[must_use]
    pub fn filter_bank(&self) -> &FilterBank {
        self.engine.filter_bank()
    }

    /// Window weights.
    #[must_use]
    pub fn window(&self) -> &Window {
        self.engine.window()
    }

    /// Name of the frame-batch backend.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Batch worker threads.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.executor.num_workers()
    }

    pub(crate) fn engine(&self) -> &Arc<FrameEngine> {
        &self.engine
    }

    /// MFCC vectors for one signal, in frame order.
    ///
    /// Signals shorter than one frame yield an empty sequence.
    ///
    /// # Errors
    /// [`ProcessingError::EmptyInput`] for an empty signal; otherwise any error
    /// from the backend, in which case no vectors are returned.
    pub fn process(&self, audio: &[f32]) -> Result<Vec<FeatureVector>, ProcessingError> {
        if audio.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }

        let config = self.config();
        let emphasized = pre_emphasis(audio, config.pre_emphasis);
        let frames = frame_signal(&emphasized, config);
        if frames.is_empty() {
            log::debug!(
                "{} samples is shorter than one frame, no output",
                audio.len()
            );
            return Ok(Vec::new());
        }

        let ctx = TransformContext {
            filter_bank: self.engine.filter_bank(),
            window: self.engine.window(),
            config,
        };
        let features = self.backend.transform(&frames, &ctx)?;
        self.check_output(frames.len(), &features)?;

        log::trace!("{} frames via {}", features.len(), self.backend.name());
        Ok(features)
    }

    // Backends are external code: never pass a short or ragged result through.
    fn check_output(
        &self,
        expected: usize,
        features: &[FeatureVector],
    ) -> Result<(), ProcessingError> {
        let width = self.config().num_coefficients;
        let well_formed = features.iter().filter(|v| v.len() == width).count();
        if features.len() == expected && well_formed == expected {
            Ok(())
        } else {
            Err(ProcessingError::AcceleratorOutput {
                expected,
                actual: well_formed,
            })
        }
    }

    /// [`Pipeline::process`] over several signals, spread across the worker pool.
    ///
    /// # Errors
    /// [`ProcessingError::EmptyBatch`] for no inputs; otherwise the first failing
    /// signal fails the whole batch.
    pub fn process_batch(
        &self,
        inputs: &[Vec<f32>],
    ) -> Result<Vec<Vec<FeatureVector>>, ProcessingError> {
        if inputs.is_empty() {
            return Err(ProcessingError::EmptyBatch);
        }
        self.executor
            .install(|| inputs.par_iter().map(|audio| self.process(audio)).collect())
    }

    /// MFCC plus first and second deltas at `delta_width`.
    ///
    /// # Errors
    /// Same as [`Pipeline::process`].
    pub fn extract(&self, audio: &[f32]) -> Result<FeatureSet, ProcessingError> {
        let mfcc = self.process(audio)?;
        let width = self.config().delta_width;
        let delta = compute_delta(&mfcc, width);
        let delta_delta = compute_delta(&delta, width);
        Ok(FeatureSet {
            mfcc,
            delta,
            delta_delta,
        })
    }

    /// MFCC and scalar descriptors per frame, always on the CPU path.
    ///
    /// # Errors
    /// Same as [`Pipeline::process`].
    pub fn analyze(&self, audio: &[f32]) -> Result<Vec<FrameAnalysis>, ProcessingError> {
        if audio.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }
        let config = self.config();
        let emphasized = pre_emphasis(audio, config.pre_emphasis);
        let frames = frame_signal(&emphasized, config);
        self.executor.map(&frames, |frame| self.engine.analyze(frame))
    }

    /// Start a [`Streamer`] fed by this pipeline's frame engine.
    ///
    /// # Errors
    /// [`ProcessingError::Worker`] if the background thread cannot be spawned.
    pub fn streamer(&self) -> Result<Streamer, ProcessingError> {
        Streamer::new(self)
    }

    /// Shut the pipeline down and release the backend.
    ///
    /// # Errors
    /// Whatever the backend reports while tearing down.
    pub fn release(mut self) -> Result<(), ProcessingError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), ProcessingError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        log::info!("Releasing {} backend", self.backend.name());
        self.backend.release()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Backend release failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chirp(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / 16_000.0;
                (2.0 * std::f32::consts::PI * (200.0 + 900.0 * t) * t).sin() * 0.3
            })
            .collect()
    }

    /// Backend double that counts releases and can be told to fail.
    struct CountingBackend {
        releases: Arc<AtomicUsize>,
        mode: Mode,
    }

    #[derive(Clone, Copy)]
    enum Mode {
        Fail,
        DropLast,
        Constant,
    }

    impl CountingBackend {
        fn boxed(mode: Mode, releases: &Arc<AtomicUsize>) -> Box<dyn FrameBatchTransform> {
            Box::new(Self {
                releases: Arc::clone(releases),
                mode,
            })
        }
    }

    impl FrameBatchTransform for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn transform(
            &self,
            frames: &[&[f32]],
            ctx: &TransformContext<'_>,
        ) -> Result<Vec<FeatureVector>, ProcessingError> {
            let width = ctx.config.num_coefficients;
            match self.mode {
                Mode::Fail => Err(ProcessingError::Accelerator("device lost".into())),
                Mode::DropLast => Ok(vec![vec![0.0; width]; frames.len() - 1]),
                Mode::Constant => Ok(vec![vec![1.0; width]; frames.len()]),
            }
        }

        fn release(&mut self) -> Result<(), ProcessingError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let config = PipelineConfig {
            num_coefficients: 40,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::new(config),
            Err(ConfigError::TooManyCoefficients { .. })
        ));
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let signal = chirp(16_000);
        let parallel = Pipeline::new(PipelineConfig {
            parallel: true,
            ..PipelineConfig::default()
        })
        .unwrap();
        let sequential = Pipeline::new(PipelineConfig {
            parallel: false,
            ..PipelineConfig::default()
        })
        .unwrap();
        assert_eq!(sequential.backend_name(), "cpu-sequential");

        let a = parallel.process(&signal).unwrap();
        let b = sequential.process(&signal).unwrap();
        assert_eq!(a.len(), 1 + (16_000 - 512) / 256);
        assert_eq!(a, b);
    }

    #[test]
    fn concurrent_callers_never_exhaust_the_pool() {
        let pipeline = Pipeline::new(PipelineConfig {
            max_concurrency: 2,
            parallel: false,
            ..PipelineConfig::default()
        })
        .unwrap();
        let signal = chirp(8_000);
        let expected = pipeline.process(&signal).unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..20 {
                        assert_eq!(pipeline.process(&signal).unwrap(), expected);
                    }
                });
            }
        });
    }

    #[test]
    fn short_input_gives_no_frames() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        assert!(pipeline.process(&[0.2; 300]).unwrap().is_empty());
        assert_eq!(pipeline.process(&[]), Err(ProcessingError::EmptyInput));
    }

    #[test]
    fn batch_keeps_input_order() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let inputs = vec![chirp(4_000), chirp(512), chirp(300), chirp(9_000)];
        let batch = pipeline.process_batch(&inputs).unwrap();
        assert_eq!(batch.len(), inputs.len());
        for (audio, features) in inputs.iter().zip(&batch) {
            assert_eq!(features, &pipeline.process(audio).unwrap());
        }
        assert_eq!(pipeline.process_batch(&[]), Err(ProcessingError::EmptyBatch));
    }

    #[test]
    fn batch_fails_as_a_whole() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let inputs = vec![chirp(2_000), Vec::new(), chirp(2_000)];
        assert_eq!(
            pipeline.process_batch(&inputs),
            Err(ProcessingError::EmptyInput)
        );
    }

    #[test]
    fn accelerator_failure_propagates_and_release_happens_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::with_accelerator(
            PipelineConfig::default(),
            CountingBackend::boxed(Mode::Fail, &releases),
        )
        .unwrap();
        assert_eq!(pipeline.backend_name(), "counting");
        assert_eq!(
            pipeline.process(&chirp(2_048)),
            Err(ProcessingError::Accelerator("device lost".into()))
        );
        pipeline.release().unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_without_release_still_releases() {
        let releases = Arc::new(AtomicUsize::new(0));
        drop(
            Pipeline::with_accelerator(
                PipelineConfig::default(),
                CountingBackend::boxed(Mode::Constant, &releases),
            )
            .unwrap(),
        );
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn short_accelerator_output_is_rejected() {
        let releases = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::with_accelerator(
            PipelineConfig::default(),
            CountingBackend::boxed(Mode::DropLast, &releases),
        )
        .unwrap();
        assert_eq!(
            pipeline.process(&chirp(1_024)),
            Err(ProcessingError::AcceleratorOutput {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn accelerator_output_is_used_verbatim() {
        let releases = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::with_accelerator(
            PipelineConfig::default(),
            CountingBackend::boxed(Mode::Constant, &releases),
        )
        .unwrap();
        let features = pipeline.process(&chirp(768)).unwrap();
        assert_eq!(features, vec![vec![1.0; 13]; 2]);
    }

    #[test]
    fn extract_builds_matching_delta_sequences() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let set = pipeline.extract(&chirp(8_000)).unwrap();
        assert_eq!(set.mfcc.len(), 1 + (8_000 - 512) / 256);
        assert_eq!(set.delta.len(), set.mfcc.len());
        assert_eq!(set.delta_delta.len(), set.mfcc.len());
        assert!(set.delta.iter().all(|v| v.len() == 13));
    }

    #[test]
    fn analyze_reports_one_entry_per_frame() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let signal = chirp(4_096);
        let analysis = pipeline.analyze(&signal).unwrap();
        let mfcc = pipeline.process(&signal).unwrap();
        assert_eq!(analysis.len(), mfcc.len());
        for (a, m) in analysis.iter().zip(&mfcc) {
            assert_eq!(&a.mfcc, m);
        }
    }
}
