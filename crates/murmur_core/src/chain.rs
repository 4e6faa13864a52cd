//! Pipeline Coordinator
//!
//! The fixed effect chain (Gate → EQ → De-Esser → Limiter) and the
//! processing-thread loops that drive it from a queue or a ring.
//!
//! The chain always works on one logical channel: interleaved input is
//! averaged down to mono and the mono result is copied to every output
//! channel.

use std::sync::Arc;

use tracing::{debug, info};

use murmur_dsp::{
    AudioEffect, DeEsser, DeEsserParams, EqParams, GateParams, Limiter, LimiterParams, NoiseGate,
    ThreeBandEq,
};

use crate::buffer_queue::BufferQueue;
use crate::config::{EffectSettings, StreamConfig};
use crate::error::EngineResult;
use crate::ring::{BlockConsumer, BlockProducer};

/// Parameter handles for every effect in the chain
///
/// Cloned freely into control surfaces; every setter is an atomic store.
#[derive(Debug, Clone)]
pub struct PipelineControls {
    pub gate: Arc<GateParams>,
    pub eq: Arc<EqParams>,
    pub de_esser: Arc<DeEsserParams>,
    pub limiter: Arc<LimiterParams>,
}

impl PipelineControls {
    /// Push a full set of settings through the handles
    pub fn apply(&self, settings: &EffectSettings) -> EngineResult<()> {
        let gate = &settings.gate;
        self.gate.set_threshold(gate.threshold);
        self.gate.set_attack_ms(gate.attack_ms);
        self.gate.set_release_ms(gate.release_ms);
        self.gate.set_enabled(gate.enabled);

        let eq = &settings.eq;
        for (band, &gain) in eq.gains.iter().enumerate() {
            self.eq.set_band_gain(band, gain)?;
        }
        self.eq.set_band_cutoff(0, eq.low_mid_cutoff_hz)?;
        self.eq.set_band_cutoff(1, eq.mid_high_cutoff_hz)?;
        self.eq.set_enabled(eq.enabled);

        let de_esser = &settings.de_esser;
        self.de_esser
            .set_frequency_range(de_esser.start_hz, de_esser.end_hz);
        self.de_esser.set_reduction_db(de_esser.reduction_db);
        self.de_esser.set_enabled(de_esser.enabled);

        let limiter = &settings.limiter;
        self.limiter.set_threshold(limiter.threshold);
        self.limiter.set_attack_ms(limiter.attack_ms);
        self.limiter.set_release_ms(limiter.release_ms);
        self.limiter.set_enabled(limiter.enabled);

        Ok(())
    }
}

/// One instance of each effect plus the scratch space to run them
///
/// # Real-time Safety
/// All buffers are sized at construction; processing never allocates.
pub struct EffectChain {
    gate: NoiseGate,
    eq: ThreeBandEq,
    de_esser: DeEsser,
    limiter: Limiter,
    block_size: usize,
    channels: usize,
    stage_a: Vec<f32>,
    stage_b: Vec<f32>,
    mono_in: Vec<f32>,
    mono_out: Vec<f32>,
}

impl EffectChain {
    pub fn new(stream: &StreamConfig, settings: &EffectSettings) -> EngineResult<Self> {
        let sample_rate = stream.sample_rate as f32;
        let block_size = stream.buffer_size as usize;
        let channels = (stream.channels as usize).max(1);

        let chain = Self {
            gate: NoiseGate::new(sample_rate, settings.gate.fft_size),
            eq: ThreeBandEq::new(sample_rate, block_size),
            de_esser: DeEsser::new(sample_rate),
            limiter: Limiter::new(sample_rate),
            block_size,
            channels,
            stage_a: vec![0.0; block_size],
            stage_b: vec![0.0; block_size],
            mono_in: vec![0.0; block_size],
            mono_out: vec![0.0; block_size],
        };
        chain.controls().apply(settings)?;

        info!(
            "Effect chain ready: {} Hz, {} frames x {} channels, latency {} frames",
            stream.sample_rate,
            block_size,
            channels,
            chain.latency_frames()
        );
        Ok(chain)
    }

    pub fn controls(&self) -> PipelineControls {
        PipelineControls {
            gate: self.gate.params(),
            eq: self.eq.params(),
            de_esser: self.de_esser.params(),
            limiter: self.limiter.params(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Added delay in frames (the EQ's overlap, whether or not it is enabled)
    pub fn latency_frames(&self) -> usize {
        self.eq.latency()
    }

    /// Smoothed gate gain, for meters
    pub fn gate_gain(&self) -> f32 {
        self.gate.current_gain()
    }

    /// Limiter gain reduction in dB, for meters
    pub fn limiter_reduction_db(&self) -> f32 {
        self.limiter.gain_reduction_db()
    }

    /// Run the chain on one mono block
    ///
    /// Blocks longer than the configured block size come out silent.
    pub fn process_mono(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len().min(output.len());
        if n > self.block_size {
            output.fill(0.0);
            return;
        }

        let (a, b) = (&mut self.stage_a[..n], &mut self.stage_b[..n]);
        self.gate.process(&input[..n], a);
        self.eq.process(a, b);
        self.de_esser.process_in_place(b);
        self.limiter.process(b, &mut output[..n]);
    }

    /// Run the chain on one interleaved block of `channels()` channels
    pub fn process_interleaved(&mut self, input: &[f32], output: &mut [f32]) {
        let channels = self.channels;
        let frames = input.len().min(output.len()) / channels;
        if frames > self.block_size {
            output.fill(0.0);
            return;
        }

        // Rust pattern: take the buffers out so `process_mono` can borrow self
        let mut mono_in = std::mem::take(&mut self.mono_in);
        let mut mono_out = std::mem::take(&mut self.mono_out);

        downmix(&input[..frames * channels], &mut mono_in[..frames], channels);
        self.process_mono(&mono_in[..frames], &mut mono_out[..frames]);
        upmix(&mono_out[..frames], &mut output[..frames * channels], channels);

        self.mono_in = mono_in;
        self.mono_out = mono_out;
    }
}

/// Average each interleaved frame down to one sample
///
/// Stops at whichever of `mono` or the complete frames of `interleaved` runs
/// out first.
#[inline]
pub fn downmix(interleaved: &[f32], mono: &mut [f32], channels: usize) {
    if channels <= 1 {
        let n = interleaved.len().min(mono.len());
        mono[..n].copy_from_slice(&interleaved[..n]);
        return;
    }
    let scale = 1.0 / channels as f32;
    for (out, frame) in mono.iter_mut().zip(interleaved.chunks_exact(channels)) {
        *out = frame.iter().sum::<f32>() * scale;
    }
}

/// Copy each mono sample to every channel of its frame
#[inline]
pub fn upmix(mono: &[f32], interleaved: &mut [f32], channels: usize) {
    for (frame, &sample) in interleaved.chunks_exact_mut(channels.max(1)).zip(mono) {
        frame.fill(sample);
    }
}

/// Blocking-queue processing loop
///
/// Pops, processes and pushes until `input` is done and drained. Returns the
/// number of blocks processed. No final block is emitted on exit.
pub fn run_processing_loop(
    input: &BufferQueue,
    output: &BufferQueue,
    chain: &mut EffectChain,
) -> u64 {
    let mut blocks = 0;
    while let Some(block) = input.pop() {
        let mut processed = vec![0.0; block.len()];
        chain.process_interleaved(&block, &mut processed);
        output.push(processed);
        blocks += 1;
    }
    debug!("Queue processing loop finished after {} blocks", blocks);
    blocks
}

/// Lock-free ring processing loop used by the live engine
///
/// Same contract as [`run_processing_loop`]: exits only when the input ring
/// is done and drained. Blocks pushed after the output ring is done are
/// dropped.
pub fn run_ring_loop(
    input: &mut BlockConsumer,
    output: &mut BlockProducer,
    chain: &mut EffectChain,
) -> u64 {
    let samples = chain.block_size() * chain.channels();
    let mut in_block = vec![0.0; samples];
    let mut out_block = vec![0.0; samples];

    let mut blocks = 0;
    while input.pop_wait_into(&mut in_block) {
        chain.process_interleaved(&in_block, &mut out_block);
        output.push_wait(&out_block);
        blocks += 1;
    }
    debug!("Ring processing loop finished after {} blocks", blocks);
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::block_ring;
    use std::thread;

    fn stream(channels: u16, buffer_size: u32) -> StreamConfig {
        StreamConfig {
            sample_rate: 48000,
            channels,
            buffer_size,
        }
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| ((i % 97) as f32 / 97.0) - 0.5).collect()
    }

    #[test]
    fn test_all_disabled_is_identity() {
        let mut chain = EffectChain::new(&stream(1, 256), &EffectSettings::default()).unwrap();
        let input = ramp(256);
        let mut output = vec![0.0; 256];

        chain.process_mono(&input, &mut output);
        assert_eq!(input, output);
    }

    #[test]
    fn test_interleaved_output_is_replicated_mono() {
        let mut chain = EffectChain::new(&stream(2, 128), &EffectSettings::default()).unwrap();
        let input: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.4 } else { 0.2 })
            .collect();
        let mut output = vec![0.0; 256];

        chain.process_interleaved(&input, &mut output);
        for frame in output.chunks_exact(2) {
            assert!((frame[0] - 0.3).abs() < 1e-6);
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_downmix_and_upmix() {
        let mut mono = [0.0; 2];
        downmix(&[1.0, 0.0, 0.5, 0.5, 0.0, 0.0], &mut mono, 3);
        assert!((mono[0] - 1.0 / 3.0).abs() < 1e-6);
        assert!((mono[1] - 1.0 / 6.0).abs() < 1e-6);

        let mut stereo = [0.0; 4];
        upmix(&[0.25, -0.5], &mut stereo, 2);
        assert_eq!(stereo, [0.25, 0.25, -0.5, -0.5]);
    }

    #[test]
    fn test_mono_downmix_tolerates_length_mismatch() {
        let mut short = [0.0; 2];
        downmix(&[0.1, 0.2, 0.3], &mut short, 1);
        assert_eq!(short, [0.1, 0.2]);

        let mut long = [9.0; 4];
        downmix(&[0.1, 0.2], &mut long, 1);
        assert_eq!(long, [0.1, 0.2, 9.0, 9.0]);
    }

    #[test]
    fn test_oversized_block_is_silent() {
        let mut chain = EffectChain::new(&stream(1, 64), &EffectSettings::default()).unwrap();
        let input = ramp(128);
        let mut output = vec![1.0; 128];
        chain.process_mono(&input, &mut output);
        assert!(output.iter().all(|&y| y == 0.0));
    }

    #[test]
    fn test_settings_reach_the_effects() {
        let mut settings = EffectSettings::default();
        settings.gate.threshold = 0.2;
        settings.eq.gains = [0.5, 1.5, 2.0];
        settings.eq.enabled = true;
        settings.de_esser.reduction_db = 12.0;
        settings.limiter.enabled = true;

        let chain = EffectChain::new(&stream(2, 256), &settings).unwrap();
        let controls = chain.controls();
        assert_eq!(controls.gate.threshold(), 0.2);
        assert!(!controls.gate.is_enabled());
        assert_eq!(controls.eq.gains(), [0.5, 1.5, 2.0]);
        assert!(controls.eq.is_enabled());
        assert_eq!(controls.de_esser.reduction_db(), 12.0);
        assert!(controls.limiter.is_enabled());
    }

    #[test]
    fn test_limiter_in_chain_caps_peaks() {
        let mut settings = EffectSettings::default();
        settings.limiter.enabled = true;
        settings.limiter.threshold = 0.5;
        let mut chain = EffectChain::new(&stream(1, 256), &settings).unwrap();

        let input = vec![1.0; 256];
        let mut output = vec![0.0; 256];
        for _ in 0..20 {
            chain.process_mono(&input, &mut output);
        }
        assert!(output.iter().all(|&y| y <= 1.0));
        assert!((output[255] - 0.5).abs() < 1e-3);
        assert!(chain.limiter_reduction_db() < -5.0);
    }

    #[test]
    fn test_eq_in_chain_adds_one_block_latency() {
        let mut settings = EffectSettings::default();
        settings.eq.enabled = true;
        let mut chain = EffectChain::new(&stream(1, 128), &settings).unwrap();
        assert_eq!(chain.latency_frames(), 128);

        let first = ramp(128);
        let second: Vec<f32> = ramp(128).iter().map(|x| -x).collect();
        let mut output = vec![0.0; 128];
        chain.process_mono(&first, &mut output);
        chain.process_mono(&second, &mut output);

        for (y, x) in output.iter().zip(&first) {
            assert!((y - x).abs() < 1e-4);
        }
    }

    #[test]
    fn test_queue_loop_processes_until_done() {
        let input = BufferQueue::new(8);
        let output = BufferQueue::new(16);
        let mut chain = EffectChain::new(&stream(2, 64), &EffectSettings::default()).unwrap();

        for i in 0..5 {
            input.push(vec![i as f32 * 0.1; 128]);
        }
        input.set_done();

        let blocks = run_processing_loop(&input, &output, &mut chain);
        assert_eq!(blocks, 5);
        assert_eq!(output.len(), 5);

        output.set_done();
        let mut i = 0;
        while let Some(block) = output.pop() {
            assert_eq!(block.len(), 128);
            assert!((block[0] - i as f32 * 0.1).abs() < 1e-6);
            i += 1;
        }
        assert_eq!(i, 5);
    }

    #[test]
    fn test_ring_loop_exits_on_done() {
        let mut chain = EffectChain::new(&stream(2, 64), &EffectSettings::default()).unwrap();
        let (mut capture_tx, mut capture_rx) = block_ring(128 * 4);
        let (mut playback_tx, mut playback_rx) = block_ring(128 * 16);

        let worker = thread::spawn(move || {
            run_ring_loop(&mut capture_rx, &mut playback_tx, &mut chain)
        });

        for i in 0..6 {
            assert!(capture_tx.push_wait(&[i as f32 * 0.1; 128]));
        }
        capture_tx.set_done();
        assert_eq!(worker.join().unwrap(), 6);

        let mut out = [0.0; 128];
        for i in 0..6 {
            playback_rx.try_pop_into(&mut out).unwrap();
            assert!((out[0] - i as f32 * 0.1).abs() < 1e-6);
        }
    }
}
