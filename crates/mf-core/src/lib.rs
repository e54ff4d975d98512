//! Shared types for melcep: pipeline configuration, error taxonomy, feature
//! containers and the frame-batch transform seam.

pub mod config;
pub mod error;
pub mod frame;
pub mod traits;
