//! Attack/release gain smoothing shared by the gate and the limiter

/// Lower bound on a time constant, in seconds
pub const TIME_EPSILON: f32 = 1e-6;

/// Shortest accepted attack time in milliseconds
pub const MIN_ATTACK_MS: f32 = 0.1;

/// Shortest accepted release time in milliseconds
pub const MIN_RELEASE_MS: f32 = 1.0;

/// One-pole smoothing coefficient for a time constant
///
/// `exp(-1 / (max(eps, ms / 1000) * sample_rate))`
#[inline]
pub fn smoothing_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let seconds = (time_ms / 1000.0).max(TIME_EPSILON);
    (-1.0 / (seconds * sample_rate)).exp()
}

/// Smoothed gain plus the coefficients derived from attack/release times
///
/// Owned by the processing thread. The times it was last computed for are
/// kept so a changed parameter is picked up with one comparison per block.
#[derive(Debug, Clone)]
pub struct EnvelopeState {
    pub current_gain: f32,
    pub attack_coeff: f32,
    pub release_coeff: f32,
    attack_ms: f32,
    release_ms: f32,
    sample_rate: f32,
}

impl EnvelopeState {
    pub fn new(sample_rate: f32, attack_ms: f32, release_ms: f32, initial_gain: f32) -> Self {
        Self {
            current_gain: initial_gain,
            attack_coeff: smoothing_coeff(attack_ms, sample_rate),
            release_coeff: smoothing_coeff(release_ms, sample_rate),
            attack_ms,
            release_ms,
            sample_rate,
        }
    }

    /// Recompute coefficients if either time changed since the last call
    #[inline]
    pub fn refresh(&mut self, attack_ms: f32, release_ms: f32) {
        if attack_ms != self.attack_ms {
            self.attack_ms = attack_ms;
            self.attack_coeff = smoothing_coeff(attack_ms, self.sample_rate);
        }
        if release_ms != self.release_ms {
            self.release_ms = release_ms;
            self.release_coeff = smoothing_coeff(release_ms, self.sample_rate);
        }
    }

    /// One step of `current = coeff * current + (1 - coeff) * target`
    #[inline]
    pub fn approach(current: f32, target: f32, coeff: f32) -> f32 {
        coeff * current + (1.0 - coeff) * target
    }
}
