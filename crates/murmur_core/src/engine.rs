//! Audio Engine - Main Entry Point
//!
//! The AudioEngine owns the live pipeline: two hardware streams, the
//! `murmur-dsp` processing thread between them, and the rings that connect
//! them.
//!
//! # Architecture
//!
//! ```text
//!  capture cb ──ring──▶ murmur-dsp (EffectChain) ──ring──▶ playback cb
//!       │                       │                              │
//!       └────────── StreamMeters / Event channel ──────────────┘
//!                               │
//!                         control thread
//! ```
//!
//! Parameters never go through the engine: callers grab
//! [`PipelineControls`] once and store into the atomic handles directly.
//!
//! # Shutdown order
//!
//! 1. Pause and drop both streams, so no callback touches a ring again.
//! 2. Mark both rings done, which releases the processing thread from any wait.
//! 3. Join the processing thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::DeviceTrait;
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::chain::{run_ring_loop, EffectChain, PipelineControls};
use crate::config::EngineConfig;
use crate::device::{find_input_device, find_output_device};
use crate::error::{EngineError, EngineResult};
use crate::message::Event;
use crate::ring::{block_ring, RingCloser};
use crate::stream::{DuplexStream, MeterSnapshot, StreamMeters};

/// Events buffered for the control thread before new ones are dropped
const EVENT_CAPACITY: usize = 256;

/// Live engine statistics for status lines and meters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub running: bool,
    pub meters: MeterSnapshot,
    /// Block latency plus the chain's added delay
    pub latency_ms: f32,
}

/// Everything that exists only while the engine runs
struct Running {
    streams: Option<DuplexStream>,
    input_closer: RingCloser,
    output_closer: RingCloser,
    worker: Option<JoinHandle<u64>>,
    controls: PipelineControls,
    meters: Arc<StreamMeters>,
    latency_ms: f32,
}

impl Running {
    /// Follows the shutdown order in the module docs; safe to call twice
    fn shutdown(&mut self) -> EngineResult<u64> {
        if let Some(streams) = self.streams.take() {
            streams.pause();
            drop(streams);
            debug!("Hardware streams released");
        }

        self.input_closer.set_done();
        self.output_closer.set_done();

        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| EngineError::ThreadPanicked),
            None => Ok(0),
        }
    }
}

/// The live pipeline controller
///
/// Lives on the control thread. `start` and `stop` may be called repeatedly;
/// each start builds a fresh effect chain from the given config.
pub struct AudioEngine {
    event_sender: Sender<Event>,
    event_receiver: Receiver<Event>,
    running: Option<Running>,
    config: Option<EngineConfig>,
}

impl AudioEngine {
    pub fn new() -> Self {
        let (event_sender, event_receiver) = bounded(EVENT_CAPACITY);
        Self {
            event_sender,
            event_receiver,
            running: None,
            config: None,
        }
    }

    /// Open the devices and start processing
    ///
    /// Starting an already running engine is a no-op.
    pub fn start(&mut self, config: EngineConfig) -> EngineResult<()> {
        if self.running.is_some() {
            warn!("Engine already running");
            return Ok(());
        }

        config.validate()?;
        info!("Starting audio engine");

        let input_device = find_input_device(config.input_device.as_deref())?;
        let output_device = find_output_device(config.output_device.as_deref())?;

        let mut chain = EffectChain::new(&config.stream, &config.effects)?;
        let controls = chain.controls();
        let latency_ms = config.stream.latency_ms()
            + chain.latency_frames() as f32 * 1000.0 / config.stream.sample_rate as f32;

        let capacity = config.ring_capacity();
        let (input_tx, mut input_rx) = block_ring(capacity);
        let (mut output_tx, output_rx) = block_ring(capacity);
        let input_closer = input_tx.closer();
        let output_closer = output_tx.closer();

        let thread_events = self.event_sender.clone();
        let worker = thread::Builder::new()
            .name("murmur-dsp".into())
            .spawn(move || {
                info!("Processing thread started");
                let blocks = run_ring_loop(&mut input_rx, &mut output_tx, &mut chain);
                info!("Processing thread exiting after {} blocks", blocks);
                let _ = thread_events.try_send(Event::ProcessingFinished { blocks });
                blocks
            })
            .map_err(EngineError::ThreadSpawn)?;

        let meters = Arc::new(StreamMeters::new());
        let mut running = Running {
            streams: None,
            input_closer,
            output_closer,
            worker: Some(worker),
            controls,
            meters: Arc::clone(&meters),
            latency_ms,
        };

        let streams = DuplexStream::start(
            &input_device,
            &output_device,
            &config.stream,
            input_tx,
            output_rx,
            meters,
            self.event_sender.clone(),
        );
        match streams {
            Ok(streams) => running.streams = Some(streams),
            Err(e) => {
                error!("Failed to start streams: {}", e);
                if let Err(join_err) = running.shutdown() {
                    warn!("Processing thread did not exit cleanly: {}", join_err);
                }
                let _ = self.event_sender.try_send(Event::error(&e));
                return Err(e);
            }
        }

        let input_name = input_device.name().unwrap_or_default();
        let output_name = output_device.name().unwrap_or_default();
        info!(
            "Audio engine started: {} -> {} ({:.1} ms)",
            input_name, output_name, latency_ms
        );
        let _ = self.event_sender.try_send(Event::Started {
            input_device: input_name,
            output_device: output_name,
        });

        self.running = Some(running);
        self.config = Some(config);
        Ok(())
    }

    /// Stop processing and release the devices
    ///
    /// Stopping a stopped engine is a no-op.
    pub fn stop(&mut self) -> EngineResult<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        info!("Stopping audio engine");
        let result = running.shutdown();
        let _ = self.event_sender.try_send(Event::Stopped);

        let blocks = result?;
        info!("Audio engine stopped after {} blocks", blocks);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Parameter handles for the running chain
    pub fn controls(&self) -> Option<PipelineControls> {
        self.running.as_ref().map(|r| r.controls.clone())
    }

    /// Config the engine was last started with
    pub fn config(&self) -> Option<&EngineConfig> {
        self.config.as_ref()
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn wait_event(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    pub fn stats(&self) -> EngineStats {
        match &self.running {
            Some(running) => EngineStats {
                running: true,
                meters: running.meters.snapshot(),
                latency_ms: running.latency_ms,
            },
            None => EngineStats::default(),
        }
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Error while stopping engine on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_engine_is_idle() {
        let engine = AudioEngine::new();
        assert!(!engine.is_running());
        assert!(engine.controls().is_none());
        assert!(engine.config().is_none());
        assert!(engine.poll_event().is_none());
        assert_eq!(engine.stats(), EngineStats::default());
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let mut engine = AudioEngine::new();
        assert!(engine.stop().is_ok());
        assert!(engine.stop().is_ok());
        assert!(engine.poll_event().is_none());
    }

    #[test]
    fn test_invalid_config_rejected_before_devices() {
        let mut engine = AudioEngine::new();
        let mut config = EngineConfig::default();
        config.stream.sample_rate = 1000;

        let result = engine.start(config);
        assert!(matches!(result, Err(EngineError::ConfigError(_))));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_running_shutdown_joins_worker() {
        let (input_tx, mut input_rx) = block_ring(8);
        let (mut output_tx, output_rx) = block_ring(8);
        let chain = EffectChain::new(
            &crate::config::StreamConfig {
                sample_rate: 48000,
                channels: 1,
                buffer_size: 4,
            },
            &Default::default(),
        )
        .unwrap();
        let controls = chain.controls();

        let worker = thread::spawn(move || {
            let mut chain = chain;
            run_ring_loop(&mut input_rx, &mut output_tx, &mut chain)
        });

        let mut running = Running {
            streams: None,
            input_closer: input_tx.closer(),
            output_closer: output_rx.closer(),
            worker: Some(worker),
            controls,
            meters: Arc::new(StreamMeters::new()),
            latency_ms: 0.0,
        };

        assert_eq!(running.shutdown().unwrap(), 0);
        assert_eq!(running.shutdown().unwrap(), 0);
    }

    // Hardware-dependent tests
    #[test]
    #[ignore = "requires audio hardware"]
    fn test_engine_start_stop() {
        let mut engine = AudioEngine::new();
        engine.start(EngineConfig::default()).unwrap();
        assert!(engine.is_running());
        assert!(engine.controls().is_some());

        let mut started = false;
        for _ in 0..10 {
            if let Some(Event::Started { .. }) = engine.wait_event(Duration::from_millis(50)) {
                started = true;
                break;
            }
        }
        assert!(started, "Should receive Started event");

        thread::sleep(Duration::from_millis(200));
        assert!(engine.stats().running);

        engine.stop().unwrap();
        assert!(!engine.is_running());
    }
}
