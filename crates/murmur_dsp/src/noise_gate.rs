//! Spectral Noise Gate
//!
//! Each block is transformed once, its bin energies are pooled into a few
//! logarithmically spaced bands, and the average band energy decides whether
//! the gate should be open (gain 1) or closed (gain 0). The decision is then
//! smoothed per sample with separate attack and release times.
//!
//! # Threshold normalization
//!
//! The averaged band energy is divided by the transform length before it is
//! compared with `threshold²`. For a full-scale sine this puts the decision
//! value around `N/16`, so thresholds live in the same [0, 1] range as
//! sample amplitudes.

use std::sync::Arc;

use tracing::warn;

use crate::effect::{pass_through, AudioEffect, EnableFlag};
use crate::envelope::{EnvelopeState, MIN_ATTACK_MS, MIN_RELEASE_MS};
use crate::error::DspError;
use crate::param::{clamp_finite, AtomicF32};
use crate::transform::{Complex32, FftTransform, Transform};

/// Number of logarithmic analysis bands
pub const NUM_BANDS: usize = 4;

pub const DEFAULT_FFT_SIZE: usize = 1024;
/// Largest transform a configuration may request
pub const MAX_FFT_SIZE: usize = 65536;
pub const DEFAULT_THRESHOLD: f32 = 0.05;
pub const DEFAULT_ATTACK_MS: f32 = 10.0;
pub const DEFAULT_RELEASE_MS: f32 = 100.0;

/// Shared, lock-free gate parameters
///
/// Cloned into control surfaces as `Arc<GateParams>`; every setter is a
/// single atomic store and clamps its input.
#[derive(Debug)]
pub struct GateParams {
    enabled: EnableFlag,
    threshold: AtomicF32,
    attack_ms: AtomicF32,
    release_ms: AtomicF32,
}

impl GateParams {
    pub fn new(threshold: f32, attack_ms: f32, release_ms: f32) -> Self {
        let params = Self {
            enabled: EnableFlag::default(),
            threshold: AtomicF32::default(),
            attack_ms: AtomicF32::default(),
            release_ms: AtomicF32::default(),
        };
        params.set_threshold(threshold);
        params.set_attack_ms(attack_ms);
        params.set_release_ms(release_ms);
        params
    }

    /// Open/close threshold, clamped to [0, 1]
    pub fn set_threshold(&self, threshold: f32) {
        self.threshold.store(clamp_finite(threshold, 0.0, 1.0));
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.load()
    }

    /// Attack time in milliseconds, at least 0.1 ms
    pub fn set_attack_ms(&self, ms: f32) {
        self.attack_ms.store(clamp_finite(ms, MIN_ATTACK_MS, f32::MAX));
    }

    pub fn attack_ms(&self) -> f32 {
        self.attack_ms.load()
    }

    /// Release time in milliseconds, at least 1 ms
    pub fn set_release_ms(&self, ms: f32) {
        self.release_ms.store(clamp_finite(ms, MIN_RELEASE_MS, f32::MAX));
    }

    pub fn release_ms(&self) -> f32 {
        self.release_ms.load()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }
}

impl Default for GateParams {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_ATTACK_MS, DEFAULT_RELEASE_MS)
    }
}

/// Band that a bin belongs to
///
/// `floor((NUM_BANDS - 1) * log2(bin) / log2(half - 1))`, clamped to the last
/// band. Degenerate transform sizes put everything in band 0.
pub(crate) fn band_of_bin(bin: usize, half: usize) -> usize {
    if bin == 0 || half <= 2 {
        return 0;
    }
    let span = ((half - 1) as f64).log2();
    let band = ((NUM_BANDS - 1) as f64 * (bin as f64).log2() / span) as usize;
    band.min(NUM_BANDS - 1)
}

/// Banded spectral noise gate
///
/// Generic over the transform so it can be tested against a reference DFT.
/// Starts closed: the first enabled block ramps up from silence.
pub struct NoiseGate<T: Transform = FftTransform> {
    params: Arc<GateParams>,
    transform: Option<T>,
    fft_size: usize,
    frame: Vec<f32>,
    spectrum: Vec<Complex32>,
    /// Precomputed band index for bins `1..fft_size / 2`
    bands: Vec<usize>,
    band_energies: [f64; NUM_BANDS],
    envelope: EnvelopeState,
}

impl NoiseGate<FftTransform> {
    pub fn new(sample_rate: f32, fft_size: usize) -> Self {
        Self::with_transform(sample_rate, FftTransform::new(fft_size))
    }
}

impl<T: Transform> NoiseGate<T> {
    /// Build around an already-acquired transform
    ///
    /// A failed acquisition leaves the gate permanently in pass-through.
    pub fn with_transform(sample_rate: f32, transform: Result<T, DspError>) -> Self {
        let params = Arc::new(GateParams::default());
        let envelope =
            EnvelopeState::new(sample_rate, params.attack_ms(), params.release_ms(), 0.0);

        let transform = match transform {
            Ok(transform) => Some(transform),
            Err(e) => {
                warn!("Noise gate transform unavailable, passing audio through: {}", e);
                None
            }
        };

        let fft_size = transform.as_ref().map_or(0, Transform::size);
        let bins = transform.as_ref().map_or(0, Transform::bins);
        let half = fft_size / 2;

        Self {
            params,
            transform,
            fft_size,
            frame: vec![0.0; fft_size],
            spectrum: vec![Complex32::default(); bins],
            bands: (0..half).map(|bin| band_of_bin(bin, half)).collect(),
            band_energies: [0.0; NUM_BANDS],
            envelope,
        }
    }

    /// Handle for control surfaces
    pub fn params(&self) -> Arc<GateParams> {
        Arc::clone(&self.params)
    }

    pub fn current_gain(&self) -> f32 {
        self.envelope.current_gain
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Whether the transform was acquired at construction
    pub fn is_available(&self) -> bool {
        self.transform.is_some()
    }

    /// Binary open/close decision for one block
    fn target_gain(&mut self, input: &[f32]) -> f32 {
        let Some(transform) = self.transform.as_mut() else {
            return 1.0;
        };

        let analyzed = input.len().min(self.fft_size);
        self.frame[..analyzed].copy_from_slice(&input[..analyzed]);
        self.frame[analyzed..].fill(0.0);
        transform.forward(&self.frame, &mut self.spectrum);

        self.band_energies = [0.0; NUM_BANDS];
        for (bin, &band) in self.bands.iter().enumerate().skip(1) {
            let energy = self.spectrum[bin].norm_sqr() as f64;
            self.band_energies[band] += energy;
        }

        let total: f64 = self.band_energies.iter().sum();
        let average = total / NUM_BANDS as f64;
        let normalized = average / self.fft_size as f64;

        let threshold = self.params.threshold() as f64;
        if normalized > threshold * threshold {
            1.0
        } else {
            0.0
        }
    }
}

impl<T: Transform> AudioEffect for NoiseGate<T> {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len().min(output.len());
        let enabled = self.is_enabled();
        if self.params.enabled.take_reset() {
            self.reset();
        }

        if !enabled || n == 0 {
            pass_through(input, output);
            if !enabled {
                self.envelope.current_gain = 0.0;
            }
            return;
        }

        self.envelope
            .refresh(self.params.attack_ms(), self.params.release_ms());
        let target = self.target_gain(&input[..n]);

        let attack = self.envelope.attack_coeff;
        let release = self.envelope.release_coeff;
        let mut gain = self.envelope.current_gain;

        for (out, &x) in output[..n].iter_mut().zip(&input[..n]) {
            gain = if target > gain {
                EnvelopeState::approach(gain, target, attack).min(target)
            } else {
                EnvelopeState::approach(gain, target, release).max(target)
            };
            *out = x * gain;
        }

        self.envelope.current_gain = gain;
    }

    fn reset(&mut self) {
        self.band_energies = [0.0; NUM_BANDS];
        self.envelope.current_gain = 0.0;
    }

    /// False forever if the transform could not be acquired
    fn is_enabled(&self) -> bool {
        self.transform.is_some() && self.params.is_enabled()
    }

    fn store_enabled(&self, enabled: bool) {
        self.params.set_enabled(enabled);
    }

    fn name(&self) -> &'static str {
        "Noise Gate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::fake::NaiveDft;

    const SAMPLE_RATE: f32 = 48000.0;

    fn sine(len: usize, freq: f32, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE).sin())
            .collect()
    }

    fn enabled_gate() -> NoiseGate {
        let mut gate = NoiseGate::new(SAMPLE_RATE, 1024);
        gate.set_enabled(true);
        gate
    }

    #[test]
    fn test_defaults() {
        let gate = NoiseGate::new(SAMPLE_RATE, DEFAULT_FFT_SIZE);
        let params = gate.params();
        assert!(!gate.is_enabled());
        assert!(gate.is_available());
        assert_eq!(gate.current_gain(), 0.0);
        assert_eq!(params.threshold(), DEFAULT_THRESHOLD);
        assert_eq!(params.attack_ms(), DEFAULT_ATTACK_MS);
        assert_eq!(params.release_ms(), DEFAULT_RELEASE_MS);
    }

    #[test]
    fn test_parameter_clamping() {
        let params = GateParams::default();

        params.set_threshold(1.5);
        assert_eq!(params.threshold(), 1.0);
        params.set_threshold(-0.5);
        assert_eq!(params.threshold(), 0.0);

        params.set_attack_ms(0.0);
        assert_eq!(params.attack_ms(), MIN_ATTACK_MS);
        params.set_release_ms(0.5);
        assert_eq!(params.release_ms(), MIN_RELEASE_MS);
    }

    #[test]
    fn test_band_assignment_is_monotonic() {
        let half = 512;
        assert_eq!(band_of_bin(1, half), 0);
        assert_eq!(band_of_bin(half - 1, half), NUM_BANDS - 1);

        let mut last = 0;
        for bin in 1..half {
            let band = band_of_bin(bin, half);
            assert!(band >= last);
            assert!(band < NUM_BANDS);
            last = band;
        }
    }

    #[test]
    fn test_band_assignment_tiny_transform() {
        assert_eq!(band_of_bin(1, 2), 0);
        assert_eq!(band_of_bin(1, 1), 0);
    }

    #[test]
    fn test_bypass_is_identity() {
        let mut gate = NoiseGate::new(SAMPLE_RATE, 1024);
        let input = sine(1024, 440.0, 0.3);
        let mut output = vec![0.0; 1024];

        gate.process(&input, &mut output);
        assert_eq!(input, output);
        assert_eq!(gate.current_gain(), 0.0);
    }

    #[test]
    fn test_loud_sine_opens_gate() {
        let mut gate = enabled_gate();
        let input = sine(1024, 1000.0, 0.5);
        let mut output = vec![0.0; 1024];

        // 10 ms attack, 10 blocks of 1024 samples is over 20 time constants
        for _ in 0..10 {
            gate.process(&input, &mut output);
        }
        assert!(gate.current_gain() > 0.999, "gain {}", gate.current_gain());
        assert!(gate.current_gain() <= 1.0);
    }

    #[test]
    fn test_silence_closes_gate() {
        let mut gate = enabled_gate();
        let loud = sine(1024, 1000.0, 0.5);
        let silence = vec![0.0; 1024];
        let mut output = vec![0.0; 1024];

        for _ in 0..10 {
            gate.process(&loud, &mut output);
        }
        assert!(gate.current_gain() > 0.999);

        // 100 ms release: ~21 ms per block, 50 blocks is ~10 time constants
        for _ in 0..50 {
            gate.process(&silence, &mut output);
        }
        assert!(gate.current_gain() < 1e-3, "gain {}", gate.current_gain());
        assert!(gate.current_gain() >= 0.0);
    }

    #[test]
    fn test_opening_ramps_monotonically() {
        let mut gate = enabled_gate();
        let input = sine(1024, 2000.0, 0.5);
        let mut output = vec![0.0; 1024];
        gate.process(&input, &mut output);

        let gains: Vec<f32> = output
            .iter()
            .zip(&input)
            .filter(|(_, x)| x.abs() > 0.1)
            .map(|(y, x)| y / x)
            .collect();
        for pair in gains.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6);
        }
    }

    #[test]
    fn test_threshold_one_keeps_quiet_signal_closed() {
        let mut gate = enabled_gate();
        gate.params().set_threshold(1.0);
        let input = sine(1024, 1000.0, 0.01);
        let mut output = vec![0.0; 1024];

        for _ in 0..5 {
            gate.process(&input, &mut output);
        }
        assert_eq!(gate.current_gain(), 0.0);
        assert!(output.iter().all(|&y| y == 0.0));
    }

    #[test]
    fn test_disable_then_enable_starts_from_silence() {
        let mut gate = enabled_gate();
        let input = sine(1024, 1000.0, 0.5);
        let mut output = vec![0.0; 1024];
        for _ in 0..10 {
            gate.process(&input, &mut output);
        }

        // Control thread flips the shared flag
        gate.params().set_enabled(false);
        gate.process(&input, &mut output);
        assert_eq!(output, input);
        assert_eq!(gate.current_gain(), 0.0);

        // One block is a little over two attack time constants
        gate.params().set_enabled(true);
        gate.process(&input, &mut output);
        assert!(gate.current_gain() > 0.5);
        assert!(gate.current_gain() < 0.95);
    }

    #[test]
    fn test_off_on_between_blocks_starts_from_silence() {
        let mut gate = enabled_gate();
        let input = sine(1024, 1000.0, 0.5);
        let mut output = vec![0.0; 1024];
        for _ in 0..10 {
            gate.process(&input, &mut output);
        }
        assert!(gate.current_gain() > 0.99);

        // Both toggles land before the next block
        gate.params().set_enabled(false);
        gate.params().set_enabled(true);
        gate.process(&input, &mut output);

        assert!((output[1] / input[1]).abs() < 0.1);
        assert!(gate.current_gain() < 0.95);
    }

    #[test]
    fn test_failed_transform_passes_through() {
        let mut gate: NoiseGate<NaiveDft> = NoiseGate::with_transform(
            SAMPLE_RATE,
            Err(DspError::AllocationFailed { len: 1024 }),
        );
        gate.set_enabled(true);
        assert!(!gate.is_available());
        assert!(!gate.is_enabled());

        let input = sine(512, 440.0, 0.4);
        let mut output = vec![0.0; 512];
        gate.process(&input, &mut output);
        assert_eq!(input, output);
    }

    #[test]
    fn test_reference_dft_matches_fft_decisions() {
        let size = 128;
        let mut fast = NoiseGate::new(SAMPLE_RATE, size);
        let mut slow: NoiseGate<NaiveDft> =
            NoiseGate::with_transform(SAMPLE_RATE, Ok(NaiveDft::new(size)));
        fast.set_enabled(true);
        slow.set_enabled(true);

        let mut a = vec![0.0; size];
        let mut b = vec![0.0; size];
        for amplitude in [0.0, 0.001, 0.02, 0.3, 0.9] {
            let input = sine(size, 3000.0, amplitude);
            fast.process(&input, &mut a);
            slow.process(&input, &mut b);

            assert!(
                (fast.current_gain() - slow.current_gain()).abs() < 1e-6,
                "amplitude {}: {} vs {}",
                amplitude,
                fast.current_gain(),
                slow.current_gain()
            );
        }
    }

    #[test]
    fn test_longer_block_only_analyzes_fft_size() {
        let mut gate = NoiseGate::new(SAMPLE_RATE, 256);
        gate.set_enabled(true);

        // Loud content only after the analyzed window: gate stays shut
        let mut input = vec![0.0; 1024];
        input[512..].copy_from_slice(&sine(512, 1000.0, 0.8));
        let mut output = vec![0.0; 1024];
        gate.process(&input, &mut output);

        assert_eq!(gate.current_gain(), 0.0);
        assert!(output.iter().all(|&y| y == 0.0));
    }
}
