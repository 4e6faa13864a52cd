//! Three-Band Spectral Equalizer
//!
//! 50%-overlap overlap-add EQ. The hop equals the streaming block size and
//! the transform spans two hops, so every output block is the input from one
//! block earlier with a frequency-dependent gain applied.
//!
//! Gain versus frequency has three flat regions (low / mid / high) joined by
//! raised-cosine bridges spanning ±20% around the two crossover cutoffs.

use std::sync::Arc;

use tracing::warn;

use crate::effect::{pass_through, AudioEffect, EnableFlag};
use crate::error::DspError;
use crate::param::{clamp_finite, AtomicF32};
use crate::transform::{hann_window, Complex32, FftTransform, Transform};

/// Low, mid, high
pub const NUM_BANDS: usize = 3;

pub const MIN_CUTOFF_HZ: f32 = 20.0;
pub const MIN_GAIN: f32 = 0.0;
pub const MAX_GAIN: f32 = 6.0;

pub const DEFAULT_LOW_MID_CUTOFF_HZ: f32 = 250.0;
pub const DEFAULT_MID_HIGH_CUTOFF_HZ: f32 = 4000.0;

/// Half-width of a crossover bridge as a fraction of its cutoff
const TRANSITION_WIDTH: f32 = 0.2;

/// Shared, lock-free EQ parameters
///
/// Band `0` is low, `1` mid, `2` high. Cutoff `0` is the low/mid crossover,
/// `1` the mid/high crossover and `2` the top of the high band.
#[derive(Debug)]
pub struct EqParams {
    enabled: EnableFlag,
    gains: [AtomicF32; NUM_BANDS],
    cutoffs: [AtomicF32; NUM_BANDS],
    nyquist: f32,
}

impl EqParams {
    pub fn new(sample_rate: f32) -> Self {
        let nyquist = (sample_rate / 2.0).max(MIN_CUTOFF_HZ);
        let params = Self {
            enabled: EnableFlag::default(),
            // Rust pattern: `from_fn` builds arrays of non-Copy atomics
            gains: core::array::from_fn(|_| AtomicF32::new(1.0)),
            cutoffs: core::array::from_fn(|_| AtomicF32::default()),
            nyquist,
        };

        let defaults = [DEFAULT_LOW_MID_CUTOFF_HZ, DEFAULT_MID_HIGH_CUTOFF_HZ, nyquist];
        for (cell, hz) in params.cutoffs.iter().zip(defaults) {
            cell.store(clamp_finite(hz, MIN_CUTOFF_HZ, nyquist));
        }
        params
    }

    /// Linear band gain, clamped to [0, 6]
    pub fn set_band_gain(&self, index: usize, gain: f32) -> Result<(), DspError> {
        let cell = self.gains.get(index).ok_or(DspError::InvalidBandIndex {
            index,
            bands: NUM_BANDS,
        })?;
        cell.store(clamp_finite(gain, MIN_GAIN, MAX_GAIN));
        Ok(())
    }

    pub fn band_gain(&self, index: usize) -> Option<f32> {
        self.gains.get(index).map(AtomicF32::load)
    }

    /// Crossover frequency in Hz, clamped to [20 Hz, Nyquist]
    pub fn set_band_cutoff(&self, index: usize, hz: f32) -> Result<(), DspError> {
        let cell = self.cutoffs.get(index).ok_or(DspError::InvalidBandIndex {
            index,
            bands: NUM_BANDS,
        })?;
        cell.store(clamp_finite(hz, MIN_CUTOFF_HZ, self.nyquist));
        Ok(())
    }

    pub fn band_cutoff(&self, index: usize) -> Option<f32> {
        self.cutoffs.get(index).map(AtomicF32::load)
    }

    pub fn gains(&self) -> [f32; NUM_BANDS] {
        core::array::from_fn(|i| self.gains[i].load())
    }

    pub fn cutoffs(&self) -> [f32; NUM_BANDS] {
        core::array::from_fn(|i| self.cutoffs[i].load())
    }

    pub fn nyquist(&self) -> f32 {
        self.nyquist
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }
}

/// Gain at `frequency` for the given band gains and crossover cutoffs
pub fn smooth_gain(frequency: f32, gains: &[f32; NUM_BANDS], cutoffs: &[f32; NUM_BANDS]) -> f32 {
    let low_start = cutoffs[0] * (1.0 - TRANSITION_WIDTH);
    let low_end = cutoffs[0] * (1.0 + TRANSITION_WIDTH);
    let high_start = cutoffs[1] * (1.0 - TRANSITION_WIDTH);
    let high_end = cutoffs[1] * (1.0 + TRANSITION_WIDTH);

    let bridge = |from: f32, to: f32, start: f32, end: f32| {
        let t = (frequency - start) / (end - start);
        let t = (1.0 - (t * std::f32::consts::PI).cos()) * 0.5;
        from * (1.0 - t) + to * t
    };

    if frequency < low_start {
        gains[0]
    } else if frequency > low_end && frequency < high_start {
        gains[1]
    } else if frequency > high_end {
        gains[2]
    } else if frequency <= low_end {
        bridge(gains[0], gains[1], low_start, low_end)
    } else {
        bridge(gains[1], gains[2], high_start, high_end)
    }
}

/// Overlap-add three-band EQ
///
/// # Block size
///
/// `process()` only accepts blocks of exactly `hop_size()` samples. Any
/// other length produces a silent block and leaves the overlap state as it
/// was.
pub struct ThreeBandEq<T: Transform = FftTransform> {
    params: Arc<EqParams>,
    transform: Option<T>,
    sample_rate: f32,
    hop_size: usize,
    fft_size: usize,
    window: Vec<f32>,
    /// Last `fft_size` input samples
    history: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex32>,
    /// Overlap tail, `fft_size - hop_size` samples
    tail: Vec<f32>,
    /// Per-bin gain, rebuilt only when a gain or cutoff changes
    curve: Vec<f32>,
    curve_key: Option<([f32; NUM_BANDS], [f32; NUM_BANDS])>,
}

impl ThreeBandEq<FftTransform> {
    /// Hop of `block_size` samples over a `2 * block_size` transform
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self::with_transform(sample_rate, block_size, FftTransform::new(block_size * 2))
    }
}

impl<T: Transform> ThreeBandEq<T> {
    /// The transform must span exactly two hops
    pub fn with_transform(
        sample_rate: f32,
        block_size: usize,
        transform: Result<T, DspError>,
    ) -> Self {
        let transform = transform.and_then(|t| {
            if block_size > 0 && t.size() == block_size * 2 {
                Ok(t)
            } else {
                Err(DspError::BufferSizeMismatch {
                    expected: block_size * 2,
                    got: t.size(),
                })
            }
        });

        let transform = match transform {
            Ok(transform) => Some(transform),
            Err(e) => {
                warn!("EQ transform unavailable, passing audio through: {}", e);
                None
            }
        };

        // Without a transform every buffer stays empty
        let (fft_size, bins) = match &transform {
            Some(t) => (t.size(), t.bins()),
            None => (0, 0),
        };

        Self {
            params: Arc::new(EqParams::new(sample_rate)),
            transform,
            sample_rate,
            hop_size: block_size,
            fft_size,
            window: hann_window(fft_size),
            history: vec![0.0; fft_size],
            frame: vec![0.0; fft_size],
            spectrum: vec![Complex32::default(); bins],
            tail: vec![0.0; fft_size.saturating_sub(block_size)],
            curve: vec![1.0; bins],
            curve_key: None,
        }
    }

    pub fn params(&self) -> Arc<EqParams> {
        Arc::clone(&self.params)
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Output lags input by this many samples
    pub fn latency(&self) -> usize {
        self.fft_size - self.hop_size.min(self.fft_size)
    }

    pub fn is_available(&self) -> bool {
        self.transform.is_some()
    }

    fn refresh_curve(&mut self) {
        let key = (self.params.gains(), self.params.cutoffs());
        if self.curve_key == Some(key) {
            return;
        }

        let (gains, cutoffs) = key;
        let last = self.curve.len().saturating_sub(1);
        let bin_hz = self.sample_rate / self.fft_size as f32;
        for (bin, gain) in self.curve.iter_mut().enumerate() {
            *gain = match bin {
                0 => gains[0],
                b if b == last => gains[2],
                b => smooth_gain(b as f32 * bin_hz, &gains, &cutoffs),
            };
        }
        self.curve_key = Some(key);
    }
}

impl<T: Transform> AudioEffect for ThreeBandEq<T> {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len().min(output.len());
        let enabled = self.is_enabled();
        if self.params.enabled.take_reset() {
            self.reset();
        }

        if !enabled {
            pass_through(input, output);
            return;
        }

        if n != self.hop_size || input.len() != self.hop_size {
            output[..n].fill(0.0);
            return;
        }

        self.refresh_curve();

        let Some(transform) = self.transform.as_mut() else {
            output[..n].fill(0.0);
            return;
        };

        let hop = self.hop_size;
        let fft_size = self.fft_size;

        // Slide the history one hop and append the new block
        self.history.copy_within(hop.., 0);
        self.history[fft_size - hop..].copy_from_slice(input);

        for ((slot, &x), &w) in self.frame.iter_mut().zip(&self.history).zip(&self.window) {
            *slot = x * w;
        }

        transform.forward(&self.frame, &mut self.spectrum);

        // Real, non-negative gain scales magnitude and keeps phase
        for (bin, &gain) in self.spectrum.iter_mut().zip(&self.curve) {
            *bin *= gain;
        }

        transform.inverse(&self.spectrum, &mut self.frame);

        let scale = 1.0 / fft_size as f32;
        let tail_len = self.tail.len();
        for (acc, &y) in self.tail.iter_mut().zip(&self.frame) {
            *acc += y * scale;
        }

        output[..hop].copy_from_slice(&self.tail[..hop]);

        self.tail.copy_within(hop.., 0);
        for (acc, &y) in self.tail[tail_len - hop..]
            .iter_mut()
            .zip(&self.frame[fft_size - hop..])
        {
            *acc = y * scale;
        }
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
        self.tail.fill(0.0);
    }

    fn is_enabled(&self) -> bool {
        self.transform.is_some() && self.params.is_enabled()
    }

    fn store_enabled(&self, enabled: bool) {
        self.params.set_enabled(enabled);
    }

    fn name(&self) -> &'static str {
        "3-Band EQ"
    }
}
