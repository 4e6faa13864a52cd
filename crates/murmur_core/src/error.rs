//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the audio engine and the offline runner
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No audio devices found")]
    NoDevicesFound,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to play audio stream: {0}")]
    StreamPlayError(String),

    #[error("Stream configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to spawn processing thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Processing thread panicked")]
    ThreadPanicked,

    #[error("DSP error: {0}")]
    DspError(#[from] murmur_dsp::DspError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
