//! Fixed-capacity scratch-buffer pool.
//!
//! Each buffer kind has its own free list, filled at construction with exactly
//! `max_concurrency` buffers. An empty free list means more frames are in flight
//! than the pipeline was configured for: `acquire` reports
//! [`ProcessingError::PoolExhausted`] instead of allocating a stray buffer.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

use mf_core::config::PipelineConfig;
use mf_core::error::ProcessingError;
use mf_core::frame::BufferKind;

use crate::spectral::{PowerSpectrum, SpectralWorkspace};

/// Free list for one kind of buffer.
///
/// # Example
/// ```
/// use mf_core::frame::BufferKind;
/// use mf_audio::pool::BufferPool;
///
/// let pool = BufferPool::new(BufferKind::Mel, 2, || vec![0.0f32; 26]);
/// let a = pool.acquire().unwrap();
/// let b = pool.acquire().unwrap();
/// assert!(pool.acquire().is_err());
/// pool.release(a);
/// pool.release(b);
/// assert_eq!(pool.available(), 2);
/// ```
#[derive(Debug)]
pub struct BufferPool<T> {
    kind: BufferKind,
    capacity: usize,
    free: Mutex<Vec<T>>,
}

impl<T> BufferPool<T> {
    /// Create a pool holding `capacity` buffers built by `make`.
    pub fn new(kind: BufferKind, capacity: usize, mut make: impl FnMut() -> T) -> Self {
        let free = (0..capacity).map(|_| make()).collect();
        Self {
            kind,
            capacity,
            free: Mutex::new(free),
        }
    }

    /// Take one buffer out of the pool.
    ///
    /// # Errors
    /// Returns [`ProcessingError::PoolExhausted`] when every buffer is in use.
    pub fn acquire(&self) -> Result<T, ProcessingError> {
        self.lock().pop().ok_or(ProcessingError::PoolExhausted {
            kind: self.kind,
            capacity: self.capacity,
        })
    }

    /// Return a buffer. Contents are left as they are.
    pub fn release(&self, buffer: T) {
        let mut free = self.lock();
        if free.len() >= self.capacity {
            // Only reachable if a caller hands back a buffer it built itself.
            log::error!("{} pool over capacity on release, dropping buffer", self.kind);
            return;
        }
        free.push(buffer);
    }

    /// Buffers currently in the free list.
    #[must_use]
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    /// Buffers owned by the pool, free or leased.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Kind of buffer this pool hands out.
    #[must_use]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> BufferPool<T> {
    /// Acquire a buffer that goes back to the pool when the lease is dropped.
    ///
    /// # Errors
    /// Returns [`ProcessingError::PoolExhausted`] when every buffer is in use.
    pub fn lease(&self) -> Result<Lease<'_, T>, ProcessingError> {
        let buffer = self.acquire()?;
        Ok(Lease { pool: self, buffer })
    }
}

/// A pooled buffer on loan. Dropping it returns the buffer exactly once.
#[derive(Debug)]
pub struct Lease<'a, T: Default> {
    pool: &'a BufferPool<T>,
    buffer: T,
}

impl<T: Default> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.buffer
    }
}

impl<T: Default> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.buffer
    }
}

impl<T: Default> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}

/// Scratch buffers for every stage of one frame computation.
#[derive(Debug)]
pub struct ScratchPool {
    frame: BufferPool<Vec<f32>>,
    spectrum: BufferPool<SpectralWorkspace>,
    mel: BufferPool<Vec<f32>>,
    log: BufferPool<Vec<f32>>,
    dct: BufferPool<Vec<f32>>,
}

impl ScratchPool {
    /// Pre-populate `config.max_concurrency` buffers of each kind.
    #[must_use]
    pub fn new(config: &PipelineConfig, spectrum: &PowerSpectrum) -> Self {
        Self::with_capacity(config, spectrum, config.max_concurrency)
    }

    /// Pre-populate `n` buffers of each kind.
    #[must_use]
    pub fn with_capacity(config: &PipelineConfig, spectrum: &PowerSpectrum, n: usize) -> Self {
        Self {
            frame: BufferPool::new(BufferKind::Frame, n, || vec![0.0; config.frame_length]),
            spectrum: BufferPool::new(BufferKind::Spectrum, n, || spectrum.workspace()),
            mel: BufferPool::new(BufferKind::Mel, n, || vec![0.0; config.num_filters]),
            log: BufferPool::new(BufferKind::Log, n, || vec![0.0; config.num_filters]),
            dct: BufferPool::new(BufferKind::Dct, n, || vec![0.0; config.num_coefficients]),
        }
    }

    /// Lease one buffer of every kind. Buffers already leased are returned if a
    /// later kind is exhausted.
    ///
    /// # Errors
    /// Returns [`ProcessingError::PoolExhausted`] for the first empty kind.
    pub fn borrow(&self) -> Result<Scratch<'_>, ProcessingError> {
        Ok(Scratch {
            frame: self.frame.lease()?,
            spectrum: self.spectrum.lease()?,
            mel: self.mel.lease()?,
            log: self.log.lease()?,
            dct: self.dct.lease()?,
        })
    }

    /// Free buffers of `kind`.
    #[must_use]
    pub fn available(&self, kind: BufferKind) -> usize {
        match kind {
            BufferKind::Frame => self.frame.available(),
            BufferKind::Spectrum => self.spectrum.available(),
            BufferKind::Mel => self.mel.available(),
            BufferKind::Log => self.log.available(),
            BufferKind::Dct => self.dct.available(),
        }
    }

    /// Buffers per kind.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.frame.capacity()
    }
}

/// One leased buffer of each kind.
#[derive(Debug)]
pub struct Scratch<'a> {
    /// `frame_length` samples.
    pub frame: Lease<'a, Vec<f32>>,
    /// FFT workspace and power bins.
    pub spectrum: Lease<'a, SpectralWorkspace>,
    /// `num_filters` Mel energies.
    pub mel: Lease<'a, Vec<f32>>,
    /// `num_filters` log energies.
    pub log: Lease<'a, Vec<f32>>,
    /// `num_coefficients` cepstral coefficients.
    pub dct: Lease<'a, Vec<f32>>,
}
