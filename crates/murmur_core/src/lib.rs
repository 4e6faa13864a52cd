//! Murmur Core - Voice Pipeline Engine
//!
//! This crate wires the `murmur_dsp` effects into a running system:
//! - Block handoff between threads (blocking [`BufferQueue`], lock-free block ring)
//! - The fixed effect chain and its processing loops
//! - Hardware capture/playback through CPAL and the engine lifecycle
//! - Offline batch measurement of a single effect over a WAV file
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control Thread                          │
//! │   PipelineControls (atomic stores)   ◀──events── Engine     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ Arc<...Params>
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Capture cb ──rtrb──▶ murmur-dsp thread ──rtrb──▶ Playback cb │
//! │            Gate → EQ → De-Esser → Limiter                   │
//! │            (Zero allocation in the callbacks)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod buffer_queue;
mod chain;
mod config;
mod device;
mod engine;
mod error;
mod message;
mod offline;
mod ring;
mod stream;

pub use buffer_queue::{AudioBlock, BufferQueue};
pub use chain::{downmix, run_processing_loop, run_ring_loop, upmix, EffectChain, PipelineControls};
pub use config::{
    DeEsserSettings, EffectSettings, EngineConfig, EqSettings, GateSettings, LimiterSettings,
    StreamConfig,
};
pub use device::{find_input_device, find_output_device, AudioDevice, DeviceType};
pub use engine::{AudioEngine, EngineStats};
pub use error::{EngineError, EngineResult};
pub use message::Event;
pub use offline::{
    run_batch, BatchEffect, BatchOptions, BatchSummary, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE,
};
pub use ring::{block_ring, BlockConsumer, BlockProducer, RingCloser, RingError, POLL_INTERVAL};
pub use stream::{
    build_capture_stream, build_playback_stream, cpal_config, DuplexStream, MeterSnapshot,
    StreamMeters,
};

// Re-export DSP types for convenience
pub use murmur_dsp::{AudioEffect, DeEsserParams, DspError, EqParams, GateParams, LimiterParams};
