//! Hardware Stream Boundary
//!
//! Builds the cpal capture and playback streams that sit on either side of
//! the processing thread:
//!
//! ```text
//! Capture callback ──BlockProducer──▶ ring ──▶ processing thread
//! processing thread ──▶ ring ──BlockConsumer──▶ Playback callback
//! ```
//!
//! Callbacks never block, allocate or log. Anything worth reporting is a
//! counter bump in [`StreamMeters`] plus a `try_send` on the event channel,
//! which silently drops the event when the channel is full.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig as CpalStreamConfig};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::warn;

use murmur_dsp::{peak, AtomicF32};

use crate::config::StreamConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::Event;
use crate::ring::{BlockConsumer, BlockProducer};

/// Levels and fault counters shared between the callbacks and the control thread
#[derive(Debug, Default)]
pub struct StreamMeters {
    input_peak: AtomicF32,
    output_peak: AtomicF32,
    underruns: AtomicU64,
    overflows: AtomicU64,
}

/// Point-in-time copy of [`StreamMeters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterSnapshot {
    pub input_peak: f32,
    pub output_peak: f32,
    pub underruns: u64,
    pub overflows: u64,
}

impl StreamMeters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set_input_peak(&self, level: f32) {
        self.input_peak.store(level);
    }

    #[inline]
    pub fn set_output_peak(&self, level: f32) {
        self.output_peak.store(level);
    }

    /// Count an underrun; returns the new total
    #[inline]
    pub fn record_underrun(&self) -> u64 {
        // Rust pattern: Relaxed is enough for a standalone counter
        self.underruns.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count an overflow; returns the new total
    #[inline]
    pub fn record_overflow(&self) -> u64 {
        self.overflows.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            input_peak: self.input_peak.load(),
            output_peak: self.output_peak.load(),
            underruns: self.underruns.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
        }
    }
}

/// cpal configuration matching a [`StreamConfig`]
pub fn cpal_config(config: &StreamConfig) -> CpalStreamConfig {
    CpalStreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
    }
}

/// Capture side of the hardware boundary
///
/// Each callback's interleaved samples go into the ring whole or not at all.
/// A block that doesn't fit is dropped and reported as an overflow.
pub fn build_capture_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: BlockProducer,
    meters: Arc<StreamMeters>,
    events: Sender<Event>,
) -> EngineResult<Stream> {
    let err_events = events.clone();

    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                meters.set_input_peak(peak(data));

                if producer.try_push(data).is_err() {
                    meters.record_overflow();
                    let _ = events.try_send(Event::InputOverflow);
                }
            },
            move |err| report_stream_error("capture", err, &err_events),
            None,
        )
        .map_err(|e| EngineError::StreamBuildError(e.to_string()))
}

/// Playback side of the hardware boundary
///
/// Fills each callback buffer with one whole processed block, or with silence
/// (reported as an underrun) when none is ready.
pub fn build_playback_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut consumer: BlockConsumer,
    meters: Arc<StreamMeters>,
    events: Sender<Event>,
) -> EngineResult<Stream> {
    let err_events = events.clone();

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if consumer.try_pop_into(data).is_err() {
                    data.fill(0.0);
                    meters.record_underrun();
                    let _ = events.try_send(Event::BufferUnderrun);
                }
                meters.set_output_peak(peak(data));
            },
            move |err| report_stream_error("playback", err, &err_events),
            None,
        )
        .map_err(|e| EngineError::StreamBuildError(e.to_string()))
}

/// Runs on cpal's error path, not the audio callback, so logging is allowed
fn report_stream_error(direction: &str, err: cpal::StreamError, events: &Sender<Event>) {
    warn!("{} stream error: {}", direction, err);
    let _ = events.try_send(Event::StreamFault {
        message: format!("{direction}: {err}"),
    });
}

/// A running capture/playback pair
///
/// Dropping it stops both hardware callbacks.
pub struct DuplexStream {
    capture: Stream,
    playback: Stream,
}

impl DuplexStream {
    /// Build both streams and start them, playback first
    pub fn start(
        input_device: &Device,
        output_device: &Device,
        config: &StreamConfig,
        producer: BlockProducer,
        consumer: BlockConsumer,
        meters: Arc<StreamMeters>,
        events: Sender<Event>,
    ) -> EngineResult<Self> {
        let cpal_config = cpal_config(config);

        let capture = build_capture_stream(
            input_device,
            &cpal_config,
            producer,
            Arc::clone(&meters),
            events.clone(),
        )?;
        let playback =
            build_playback_stream(output_device, &cpal_config, consumer, meters, events)?;

        playback
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;
        capture
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;

        Ok(Self { capture, playback })
    }

    /// Stop the callbacks without releasing the devices
    pub fn pause(&self) {
        if let Err(e) = self.capture.pause() {
            warn!("Failed to pause capture stream: {}", e);
        }
        if let Err(e) = self.playback.pause() {
            warn!("Failed to pause playback stream: {}", e);
        }
    }
}
