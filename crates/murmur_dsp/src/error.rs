//! DSP Error Types

use thiserror::Error;

/// Errors that can occur during DSP operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Invalid band index: {index} (must be below {bands})")]
    InvalidBandIndex { index: usize, bands: usize },

    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f32),

    #[error("Transform length must be at least 2, got {0}")]
    InvalidTransformLength(usize),

    #[error("Failed to allocate {len} samples of transform buffer")]
    AllocationFailed { len: usize },

    #[error("Buffer size mismatch: expected {expected}, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },
}
