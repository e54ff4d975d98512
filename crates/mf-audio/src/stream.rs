//! Continuous feature extraction from incrementally written audio.
//!
//! Producers call [`Streamer::write`] from any thread. A background worker cuts
//! frames out of the accumulated samples and pushes MFCC vectors into a bounded
//! channel of `max_concurrency` slots. The push never blocks: when the channel
//! is full the vector is dropped. This stream is lossy on purpose, a slow
//! reader loses frames instead of stalling the producers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{RecvTimeoutError, TrySendError};
use mf_core::error::ProcessingError;
use mf_core::frame::FeatureVector;

use crate::engine::FrameEngine;
use crate::pipeline::Pipeline;

/// Upper bound on how long the worker sleeps without a wake-up.
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Pre-emphasised samples not yet consumed by the framer.
#[derive(Debug, Default)]
struct SampleBuffer {
    samples: Vec<f32>,
    head: usize,
    /// Incoming samples to discard when `hop_length > frame_length`.
    skip: usize,
    /// Last raw sample, for pre-emphasis across writes.
    prev: Option<f32>,
}

impl SampleBuffer {
    fn push(&mut self, input: &[f32], alpha: f32) {
        for &x in input {
            let y = match self.prev {
                Some(p) => x - alpha * p,
                None => x,
            };
            self.prev = Some(x);
            if self.skip > 0 {
                self.skip -= 1;
            } else {
                self.samples.push(y);
            }
        }
    }

    /// Copy the next full frame into `frame` and advance by `hop`.
    fn next_frame(&mut self, frame: &mut Vec<f32>, frame_length: usize, hop: usize) -> bool {
        if self.samples.len() - self.head < frame_length {
            return false;
        }
        frame.clear();
        frame.extend_from_slice(&self.samples[self.head..self.head + frame_length]);

        self.head += hop;
        if self.head > self.samples.len() {
            self.skip = self.head - self.samples.len();
            self.head = self.samples.len();
        }
        // compaction
        if self.head * 2 >= self.samples.len() {
            self.samples.drain(..self.head);
            self.head = 0;
        }
        true
    }
}

#[derive(Debug, Default)]
struct Shared {
    buffer: Mutex<SampleBuffer>,
    stop: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SampleBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Streaming MFCC extractor bound to a [`Pipeline`].
///
/// Two states: running, then closed for good. After [`Streamer::close`] the
/// samples already written are framed, queued vectors stay readable, and
/// [`Streamer::read`] returns `None` once they are gone.
///
/// The worker computes frames with the pipeline's CPU engine on a scratch set
/// of its own, so streams never compete with batch calls for pooled buffers.
///
/// # Example
/// ```
/// use mf_core::config::PipelineConfig;
/// use mf_audio::Pipeline;
///
/// let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
/// let stream = pipeline.streamer().unwrap();
/// stream.write(&vec![0.1; 1024]);
/// stream.close();
/// let mut n = 0;
/// while let Some(v) = stream.read() {
///     assert_eq!(v.len(), 13);
///     n += 1;
/// }
/// assert_eq!(n, 3);
/// ```
pub struct Streamer {
    shared: Arc<Shared>,
    pre_emphasis: f32,
    results: flume::Receiver<FeatureVector>,
    wake: flume::Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Streamer {
    /// Start the background worker.
    ///
    /// # Errors
    /// [`ProcessingError::Worker`] if the thread cannot be spawned.
    pub fn new(pipeline: &Pipeline) -> Result<Self, ProcessingError> {
        let engine = Arc::clone(pipeline.engine());
        let config = engine.config();
        let pre_emphasis = config.pre_emphasis;

        let (result_tx, result_rx) = flume::bounded(config.max_concurrency);
        let (wake_tx, wake_rx) = flume::bounded(1);
        let shared = Arc::new(Shared::default());

        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("mfcc-stream".into())
            .spawn(move || run_worker(&engine, &worker_shared, &result_tx, &wake_rx))
            .map_err(|e| ProcessingError::Worker(e.to_string()))?;

        log::debug!("Streamer started");
        Ok(Self {
            shared,
            pre_emphasis,
            results: result_rx,
            wake: wake_tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Append samples. Returns immediately; ignored once the stream is closed.
    pub fn write(&self, samples: &[f32]) {
        if self.is_closed() {
            log::warn!("write of {} samples after close ignored", samples.len());
            return;
        }
        self.shared.lock().push(samples, self.pre_emphasis);
        // Full means a wake-up is already pending.
        let _ = self.wake.try_send(());
    }

    /// Next vector, blocking until one is available. `None` marks the end of the
    /// stream: closed and fully drained.
    pub fn read(&self) -> Option<FeatureVector> {
        self.results.recv().ok()
    }

    /// Next vector if one is queued right now.
    pub fn try_read(&self) -> Option<FeatureVector> {
        self.results.try_recv().ok()
    }

    /// Whether [`Streamer::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Complete frames already written are still processed. Single use: later
    /// calls do nothing.
    pub fn close(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        self.shared.stop.store(true, Ordering::Release);
        let _ = self.wake.try_send(());
        if handle.join().is_err() {
            log::error!("Stream worker panicked");
        }
        log::debug!("Streamer closed");
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    engine: &FrameEngine,
    shared: &Shared,
    results: &flume::Sender<FeatureVector>,
    wake: &flume::Receiver<()>,
) {
    let frame_length = engine.config().frame_length;
    let hop = engine.config().hop_length;
    let mut frame = Vec::with_capacity(frame_length);
    let mut dropped = 0usize;
    // One worker, one frame in flight.
    let scratch = engine.scratch_pool(1);

    loop {
        // Read before draining so a close never strands written samples.
        let stopping = shared.stop.load(Ordering::Acquire);

        // Lock released between frames.
        while shared.lock().next_frame(&mut frame, frame_length, hop) {
            match engine.compute_in(&scratch, &frame) {
                Ok(features) => match results.try_send(features) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        log::debug!("Result channel full, frame dropped");
                    }
                    Err(TrySendError::Disconnected(_)) => return,
                },
                Err(e) => log::warn!("Stream frame skipped: {e}"),
            }
        }

        if stopping {
            break;
        }
        match wake.recv_timeout(IDLE_POLL) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => shared.stop.store(true, Ordering::Release),
        }
    }

    if dropped > 0 {
        log::info!("Stream worker exiting, {dropped} frames dropped on full channel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::config::PipelineConfig;

    fn tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 330.0 * i as f32 / 16_000.0).sin() * 0.4)
            .collect()
    }

    fn drain(stream: &Streamer) -> Vec<FeatureVector> {
        std::iter::from_fn(|| stream.read()).collect()
    }

    #[test]
    fn matches_batch_output_when_channel_is_large_enough() {
        let pipeline = Pipeline::new(PipelineConfig {
            max_concurrency: 8,
            ..PipelineConfig::default()
        })
        .unwrap();
        let signal = tone(3 * 512);

        let stream = pipeline.streamer().unwrap();
        stream.write(&signal);
        stream.close();
        let streamed = drain(&stream);

        assert_eq!(streamed.len(), 1 + (3 * 512 - 512) / 256);
        assert_eq!(streamed, pipeline.process(&signal).unwrap());
    }

    #[test]
    fn split_writes_equal_one_write() {
        let pipeline = Pipeline::new(PipelineConfig {
            max_concurrency: 8,
            ..PipelineConfig::default()
        })
        .unwrap();
        let signal = tone(2_000);

        let stream = pipeline.streamer().unwrap();
        for chunk in signal.chunks(97) {
            stream.write(chunk);
        }
        stream.close();
        assert_eq!(drain(&stream), pipeline.process(&signal).unwrap());
    }

    #[test]
    fn full_channel_drops_results() {
        let pipeline = Pipeline::new(PipelineConfig {
            max_concurrency: 1,
            ..PipelineConfig::default()
        })
        .unwrap();
        let stream = pipeline.streamer().unwrap();
        stream.write(&tone(3 * 512));
        stream.close();
        assert_eq!(drain(&stream).len(), 1);
    }

    #[test]
    fn concurrent_reader_sees_every_frame() {
        let pipeline = Pipeline::new(PipelineConfig {
            max_concurrency: 8,
            ..PipelineConfig::default()
        })
        .unwrap();
        let signal = tone(3 * 512);
        let stream = pipeline.streamer().unwrap();

        let streamed = std::thread::scope(|s| {
            let reader = s.spawn(|| drain(&stream));
            for chunk in signal.chunks(128) {
                stream.write(chunk);
            }
            stream.close();
            reader.join().unwrap()
        });
        assert_eq!(streamed, pipeline.process(&signal).unwrap());
    }

    #[test]
    fn concurrent_writers_are_all_framed() {
        const WRITERS: usize = 4;
        const WRITES: usize = 8;
        const CHUNK: usize = 256;

        let pipeline = Pipeline::new(PipelineConfig {
            max_concurrency: 64,
            ..PipelineConfig::default()
        })
        .unwrap();
        let stream = pipeline.streamer().unwrap();
        let chunk = tone(CHUNK);

        let streamed = std::thread::scope(|s| {
            let reader = s.spawn(|| drain(&stream));
            let writers: Vec<_> = (0..WRITERS)
                .map(|_| {
                    s.spawn(|| {
                        for _ in 0..WRITES {
                            stream.write(&chunk);
                        }
                    })
                })
                .collect();
            for w in writers {
                w.join().unwrap();
            }
            stream.close();
            reader.join().unwrap()
        });

        let total = WRITERS * WRITES * CHUNK;
        assert_eq!(streamed.len(), pipeline.config().frame_count(total));
        assert!(streamed.iter().all(|v| v.len() == 13));
    }

    #[test]
    fn batch_calls_run_beside_an_active_stream() {
        let pipeline = Pipeline::new(PipelineConfig {
            max_concurrency: 1,
            parallel: false,
            ..PipelineConfig::default()
        })
        .unwrap();
        let signal = tone(4_096);
        let expected = pipeline.process(&signal).unwrap();
        let stream = pipeline.streamer().unwrap();

        for _ in 0..50 {
            stream.write(&signal);
            assert_eq!(pipeline.process(&signal).unwrap(), expected);
            while stream.try_read().is_some() {}
        }
        stream.close();
    }

    #[test]
    fn hop_longer_than_frame_skips_samples() {
        let config = PipelineConfig {
            frame_length: 4,
            hop_length: 6,
            num_filters: 2,
            num_coefficients: 2,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config).unwrap();
        let signal = tone(20);

        let stream = pipeline.streamer().unwrap();
        for chunk in signal.chunks(3) {
            stream.write(chunk);
        }
        stream.close();
        let streamed = drain(&stream);
        assert_eq!(streamed.len(), 3);
        assert_eq!(streamed, pipeline.process(&signal).unwrap());
    }

    #[test]
    fn close_is_single_use_and_ends_the_stream() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let stream = pipeline.streamer().unwrap();
        assert!(!stream.is_closed());
        stream.write(&tone(100));
        stream.close();
        stream.close();
        assert!(stream.is_closed());
        stream.write(&tone(4_096));
        assert_eq!(stream.read(), None);
        assert_eq!(stream.try_read(), None);
    }
}
