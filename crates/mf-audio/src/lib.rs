//! MFCC extraction for melcep: filterbank and window builders, the per-frame
//! spectral pipeline, the scratch-buffer pool, batch and streaming execution.

pub mod batch;
pub mod delta;
pub mod descriptors;
pub mod engine;
pub mod mel;
pub mod normalize;
pub mod pipeline;
pub mod pool;
pub mod spectral;
pub mod stream;
pub mod window;

pub use pipeline::Pipeline;
pub use stream::Streamer;
