//! Engine and Stream Configuration
//!
//! Startup values only. Nothing here is written back to disk; live changes
//! go through the atomic parameter handles in [`crate::PipelineControls`].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use murmur_dsp::consts;

use crate::error::{EngineError, EngineResult};

/// Audio stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Block size in frames; also the EQ hop size
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 1024,
        }
    }
}

impl StreamConfig {
    /// Calculate latency in milliseconds for one block
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Interleaved samples in one block
    pub fn samples_per_block(&self) -> usize {
        self.buffer_size as usize * self.channels as usize
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        if self.buffer_size < 32 || self.buffer_size > 8192 {
            return Err(format!("Invalid buffer size: {}", self.buffer_size));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub enabled: bool,
    pub threshold: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    /// Analysis transform length; fixed for the lifetime of the engine
    pub fft_size: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: consts::gate::DEFAULT_THRESHOLD,
            attack_ms: consts::gate::DEFAULT_ATTACK_MS,
            release_ms: consts::gate::DEFAULT_RELEASE_MS,
            fft_size: consts::gate::DEFAULT_FFT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqSettings {
    pub enabled: bool,
    /// Linear gains for low, mid and high
    pub gains: [f32; 3],
    pub low_mid_cutoff_hz: f32,
    pub mid_high_cutoff_hz: f32,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            gains: [1.0; 3],
            low_mid_cutoff_hz: consts::eq::DEFAULT_LOW_MID_CUTOFF_HZ,
            mid_high_cutoff_hz: consts::eq::DEFAULT_MID_HIGH_CUTOFF_HZ,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeEsserSettings {
    pub enabled: bool,
    pub start_hz: f32,
    pub end_hz: f32,
    pub reduction_db: f32,
}

impl Default for DeEsserSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hz: consts::de_esser::DEFAULT_START_HZ,
            end_hz: consts::de_esser::DEFAULT_END_HZ,
            reduction_db: consts::de_esser::DEFAULT_REDUCTION_DB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterSettings {
    pub enabled: bool,
    pub threshold: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: consts::limiter::DEFAULT_THRESHOLD,
            attack_ms: consts::limiter::DEFAULT_ATTACK_MS,
            release_ms: consts::limiter::DEFAULT_RELEASE_MS,
        }
    }
}

/// Startup values for every effect in the chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub gate: GateSettings,
    pub eq: EqSettings,
    pub de_esser: DeEsserSettings,
    pub limiter: LimiterSettings,
}

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stream configuration
    pub stream: StreamConfig,

    /// Ring capacity in blocks, per direction
    pub queue_blocks: usize,

    /// Capture device name; `None` uses the system default
    pub input_device: Option<String>,

    /// Playback device name; `None` uses the system default
    pub output_device: Option<String>,

    pub effects: EffectSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            queue_blocks: 4,
            input_device: None,
            output_device: None,
            effects: EffectSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 256, // ~5.3ms per block
            },
            queue_blocks: 8,
            ..Default::default()
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 2048, // ~43ms per block
            },
            queue_blocks: 4,
            ..Default::default()
        }
    }

    /// Read a JSON config; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.stream.validate().map_err(EngineError::ConfigError)?;
        if self.queue_blocks == 0 {
            return Err(EngineError::ConfigError(
                "queue_blocks must be at least 1".into(),
            ));
        }
        let fft_size = self.effects.gate.fft_size;
        if !(2..=consts::gate::MAX_FFT_SIZE).contains(&fft_size) {
            return Err(EngineError::ConfigError(format!(
                "Invalid gate transform length: {} (2..={})",
                fft_size,
                consts::gate::MAX_FFT_SIZE
            )));
        }
        Ok(())
    }

    /// Ring capacity in interleaved samples
    pub fn ring_capacity(&self) -> usize {
        self.queue_blocks * self.stream.samples_per_block()
    }
}
