//! Peak Limiter
//!
//! Time-domain peak follower. Gain only ever moves between the per-sample
//! target and unity, so the output magnitude never exceeds the input.

use std::sync::Arc;

use crate::effect::{pass_through, AudioEffect, EnableFlag};
use crate::envelope::{EnvelopeState, MIN_ATTACK_MS, MIN_RELEASE_MS, TIME_EPSILON};
use crate::param::{clamp_finite, AtomicF32};

pub const DEFAULT_THRESHOLD: f32 = 0.9;
pub const DEFAULT_ATTACK_MS: f32 = 5.0;
pub const DEFAULT_RELEASE_MS: f32 = 100.0;

#[derive(Debug)]
pub struct LimiterParams {
    enabled: EnableFlag,
    threshold: AtomicF32,
    attack_ms: AtomicF32,
    release_ms: AtomicF32,
}

impl LimiterParams {
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

    /// Ceiling as a linear amplitude, clamped to [0, 1]
    pub fn set_threshold(&self, threshold: f32) {
        self.threshold.store(clamp_finite(threshold, 0.0, 1.0));
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.load()
    }

    pub fn set_attack_ms(&self, ms: f32) {
        self.attack_ms.store(clamp_finite(ms, MIN_ATTACK_MS, f32::MAX));
    }

    pub fn attack_ms(&self) -> f32 {
        self.attack_ms.load()
    }

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

impl Default for LimiterParams {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_ATTACK_MS, DEFAULT_RELEASE_MS)
    }
}

pub struct Limiter {
    params: Arc<LimiterParams>,
    envelope: EnvelopeState,
}

impl Limiter {
    pub fn new(sample_rate: f32) -> Self {
        let params = Arc::new(LimiterParams::default());
        let envelope =
            EnvelopeState::new(sample_rate, params.attack_ms(), params.release_ms(), 1.0);
        Self {
            params,
            envelope,
        }
    }

    pub fn params(&self) -> Arc<LimiterParams> {
        Arc::clone(&self.params)
    }

    /// Current linear gain, 1.0 when idle
    pub fn current_gain(&self) -> f32 {
        self.envelope.current_gain
    }

    /// Current gain reduction in dB (0 or negative)
    pub fn gain_reduction_db(&self) -> f32 {
        20.0 * self.envelope.current_gain.max(TIME_EPSILON).log10()
    }
}

impl AudioEffect for Limiter {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len().min(output.len());
        let enabled = self.is_enabled();
        if self.params.enabled.take_reset() {
            self.reset();
        }

        if !enabled {
            self.envelope.current_gain = 1.0;
            pass_through(input, output);
            return;
        }

        self.envelope
            .refresh(self.params.attack_ms(), self.params.release_ms());
        let threshold = self.params.threshold();
        let attack = self.envelope.attack_coeff;
        let release = self.envelope.release_coeff;
        let mut gain = self.envelope.current_gain;

        for (out, &x) in output[..n].iter_mut().zip(&input[..n]) {
            let level = x.abs();
            let target = if level <= threshold {
                1.0
            } else {
                threshold / (level + TIME_EPSILON)
            };

            gain = if target < gain {
                EnvelopeState::approach(gain, target, attack).max(target)
            } else {
                EnvelopeState::approach(gain, target, release).min(1.0)
            };
            *out = x * gain;
        }

        self.envelope.current_gain = gain;
    }

    fn reset(&mut self) {
        self.envelope.current_gain = 1.0;
    }

    fn is_enabled(&self) -> bool {
        self.params.is_enabled()
    }

    fn store_enabled(&self, enabled: bool) {
        self.params.set_enabled(enabled);
    }

    fn name(&self) -> &'static str {
        "Limiter"
    }
}
