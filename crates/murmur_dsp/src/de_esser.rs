//! Spectral De-Esser
//!
//! Splits audio into non-overlapping frames, attenuates every bin inside the
//! sibilance range by a fixed factor and transforms back. Frames are neither
//! windowed nor overlapped, so a discontinuity can appear at frame edges.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::error::DspError;
use crate::param::{clamp_finite, AtomicF32};
use crate::transform::{Complex32, FftTransform, Transform};

pub const FRAME_SIZE: usize = 2048;

pub const DEFAULT_START_HZ: f32 = 4000.0;
pub const DEFAULT_END_HZ: f32 = 10000.0;
pub const DEFAULT_REDUCTION_DB: f32 = 6.0;
pub const MAX_REDUCTION_DB: f32 = 60.0;

/// Reduce sibilance across a whole recording, in place
///
/// `samples` is processed in frames of [`FRAME_SIZE`]; the last partial frame
/// is zero-padded for analysis and only its real samples are written back.
pub fn apply_de_esser(
    samples: &mut [f32],
    sample_rate: f32,
    start_hz: f32,
    end_hz: f32,
    reduction_db: f32,
) -> Result<(), DspError> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(DspError::InvalidSampleRate(sample_rate));
    }
    if samples.is_empty() {
        return Ok(());
    }

    let mut kernel = FrameKernel::new(FftTransform::new(FRAME_SIZE)?);
    let band = SibilanceBand {
        sample_rate,
        start_hz,
        end_hz,
        gain: db_to_gain(reduction_db),
    };
    kernel.run(samples, band);
    Ok(())
}

/// Linear factor for a reduction in dB: `10^(-dB / 20)`
#[inline]
pub fn db_to_gain(reduction_db: f32) -> f32 {
    10.0_f32.powf(-reduction_db / 20.0)
}

#[derive(Debug, Clone, Copy)]
struct SibilanceBand {
    sample_rate: f32,
    start_hz: f32,
    end_hz: f32,
    gain: f32,
}

/// Transform plus frame buffers, reused for every frame
struct FrameKernel<T: Transform> {
    transform: T,
    frame: Vec<f32>,
    spectrum: Vec<Complex32>,
}

impl<T: Transform> FrameKernel<T> {
    fn new(transform: T) -> Self {
        let (size, bins) = (transform.size(), transform.bins());
        Self {
            transform,
            frame: vec![0.0; size],
            spectrum: vec![Complex32::default(); bins],
        }
    }

    fn run(&mut self, samples: &mut [f32], band: SibilanceBand) {
        let size = self.transform.size();
        let bin_hz = band.sample_rate / size as f32;
        let scale = 1.0 / size as f32;

        for chunk in samples.chunks_mut(size) {
            self.transform.forward(chunk, &mut self.spectrum);

            // Positive bins below Nyquist; the inverse rebuilds their mirrors
            for (j, bin) in self.spectrum.iter_mut().enumerate().take(size / 2) {
                let freq = j as f32 * bin_hz;
                if freq >= band.start_hz && freq <= band.end_hz {
                    *bin *= band.gain;
                }
            }

            self.transform.inverse(&self.spectrum, &mut self.frame);
            for (out, &y) in chunk.iter_mut().zip(&self.frame) {
                *out = y * scale;
            }
        }
    }
}

/// Shared, lock-free de-esser parameters
#[derive(Debug)]
pub struct DeEsserParams {
    enabled: AtomicBool,
    start_hz: AtomicF32,
    end_hz: AtomicF32,
    reduction_db: AtomicF32,
    nyquist: f32,
}

impl DeEsserParams {
    pub fn new(sample_rate: f32) -> Self {
        let params = Self {
            enabled: AtomicBool::new(false),
            start_hz: AtomicF32::default(),
            end_hz: AtomicF32::default(),
            reduction_db: AtomicF32::default(),
            nyquist: (sample_rate / 2.0).max(0.0),
        };
        params.set_frequency_range(DEFAULT_START_HZ, DEFAULT_END_HZ);
        params.set_reduction_db(DEFAULT_REDUCTION_DB);
        params
    }

    /// Attenuated range in Hz, clamped to [0, Nyquist] and put in order
    pub fn set_frequency_range(&self, start_hz: f32, end_hz: f32) {
        let start = clamp_finite(start_hz, 0.0, self.nyquist);
        let end = clamp_finite(end_hz, 0.0, self.nyquist);
        self.start_hz.store(start.min(end));
        self.end_hz.store(start.max(end));
    }

    pub fn start_hz(&self) -> f32 {
        self.start_hz.load()
    }

    pub fn end_hz(&self) -> f32 {
        self.end_hz.load()
    }

    /// Attenuation in dB, clamped to [0, 60]
    pub fn set_reduction_db(&self, db: f32) {
        self.reduction_db.store(clamp_finite(db, 0.0, MAX_REDUCTION_DB));
    }

    pub fn reduction_db(&self) -> f32 {
        self.reduction_db.load()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

/// Streaming form of [`apply_de_esser`] for the processing chain
///
/// Holds no audio between calls: each block is handled as its own set of
/// frames. Owns its transform and buffers so per-block calls never allocate.
pub struct DeEsser<T: Transform = FftTransform> {
    params: Arc<DeEsserParams>,
    kernel: Option<FrameKernel<T>>,
    sample_rate: f32,
}

impl DeEsser<FftTransform> {
    pub fn new(sample_rate: f32) -> Self {
        Self::with_transform(sample_rate, FftTransform::new(FRAME_SIZE))
    }
}

impl<T: Transform> DeEsser<T> {
    pub fn with_transform(sample_rate: f32, transform: Result<T, DspError>) -> Self {
        let kernel = match transform {
            Ok(transform) => Some(FrameKernel::new(transform)),
            Err(e) => {
                warn!("De-esser transform unavailable, passing audio through: {}", e);
                None
            }
        };

        Self {
            params: Arc::new(DeEsserParams::new(sample_rate)),
            kernel,
            sample_rate,
        }
    }

    pub fn params(&self) -> Arc<DeEsserParams> {
        Arc::clone(&self.params)
    }

    pub fn is_enabled(&self) -> bool {
        self.kernel.is_some() && self.params.is_enabled()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.params.set_enabled(enabled);
    }

    pub fn is_available(&self) -> bool {
        self.kernel.is_some()
    }

    /// De-ess `samples` in place; untouched when disabled
    pub fn process_in_place(&mut self, samples: &mut [f32]) {
        if !self.params.is_enabled() {
            return;
        }
        let Some(kernel) = self.kernel.as_mut() else {
            return;
        };

        let band = SibilanceBand {
            sample_rate: self.sample_rate,
            start_hz: self.params.start_hz(),
            end_hz: self.params.end_hz(),
            gain: db_to_gain(self.params.reduction_db()),
        };
        kernel.run(samples, band);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SpectrumMeter;
    use crate::transform::fake::NaiveDft;

    const SAMPLE_RATE: f32 = 48000.0;

    /// 1.5 kHz voice tone plus a 6 kHz hiss tone, both bin-aligned at 2048
    fn voice_with_hiss(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE;
                0.4 * (2.0 * std::f32::consts::PI * 1500.0 * t).sin()
                    + 0.2 * (2.0 * std::f32::consts::PI * 6000.0 * t).sin()
            })
            .collect()
    }

    fn energies(samples: &[f32]) -> (f64, f64) {
        let mut meter = SpectrumMeter::new(SAMPLE_RATE, FRAME_SIZE).unwrap();
        let mut inside = 0.0;
        let mut outside = 0.0;
        for frame in samples.chunks(FRAME_SIZE) {
            inside += meter.energy_between(frame, DEFAULT_START_HZ, DEFAULT_END_HZ);
            outside += meter.energy_between(frame, 0.0, DEFAULT_START_HZ - 1.0);
        }
        (inside, outside)
    }

    #[test]
    fn test_db_to_gain() {
        assert_eq!(db_to_gain(0.0), 1.0);
        assert!((db_to_gain(20.0) - 0.1).abs() < 1e-6);
        assert!((db_to_gain(6.0) - 0.501).abs() < 1e-3);
    }

    #[test]
    fn test_zero_reduction_is_transparent() {
        let original = voice_with_hiss(5000);
        let mut samples = original.clone();
        apply_de_esser(&mut samples, SAMPLE_RATE, 4000.0, 10000.0, 0.0).unwrap();

        for (y, x) in samples.iter().zip(&original) {
            assert!((y - x).abs() < 1e-5);
        }
    }

    #[test]
    fn test_more_reduction_means_less_sibilance() {
        let original = voice_with_hiss(FRAME_SIZE * 3);
        let (hiss_in, voice_in) = energies(&original);

        let mut last_hiss = hiss_in;
        for db in [3.0, 6.0, 12.0, 24.0] {
            let mut samples = original.clone();
            apply_de_esser(&mut samples, SAMPLE_RATE, 4000.0, 10000.0, db).unwrap();
            let (hiss, voice) = energies(&samples);

            assert!(hiss < last_hiss, "{} dB: {} >= {}", db, hiss, last_hiss);
            assert!(((voice - voice_in) / voice_in).abs() < 1e-3);
            last_hiss = hiss;
        }

        // 24 dB is a factor of ~251 in energy
        assert!(last_hiss < hiss_in / 200.0);
    }

    #[test]
    fn test_partial_frame_keeps_length() {
        let mut samples = voice_with_hiss(FRAME_SIZE + 100);
        apply_de_esser(&mut samples, SAMPLE_RATE, 4000.0, 10000.0, 12.0).unwrap();
        assert_eq!(samples.len(), FRAME_SIZE + 100);
        assert!(samples.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_empty_and_invalid_input() {
        let mut empty: Vec<f32> = Vec::new();
        assert!(apply_de_esser(&mut empty, SAMPLE_RATE, 4000.0, 10000.0, 6.0).is_ok());

        let mut samples = vec![0.1; 16];
        assert_eq!(
            apply_de_esser(&mut samples, 0.0, 4000.0, 10000.0, 6.0),
            Err(DspError::InvalidSampleRate(0.0))
        );
    }

    #[test]
    fn test_parameter_clamping() {
        let params = DeEsserParams::new(SAMPLE_RATE);
        assert_eq!(params.start_hz(), DEFAULT_START_HZ);
        assert_eq!(params.end_hz(), DEFAULT_END_HZ);
        assert_eq!(params.reduction_db(), DEFAULT_REDUCTION_DB);

        params.set_frequency_range(9000.0, 3000.0);
        assert_eq!(params.start_hz(), 3000.0);
        assert_eq!(params.end_hz(), 9000.0);

        params.set_frequency_range(-5.0, 50000.0);
        assert_eq!(params.start_hz(), 0.0);
        assert_eq!(params.end_hz(), 24000.0);

        params.set_reduction_db(100.0);
        assert_eq!(params.reduction_db(), MAX_REDUCTION_DB);
        params.set_reduction_db(-3.0);
        assert_eq!(params.reduction_db(), 0.0);
    }

    #[test]
    fn test_streaming_bypass_is_identity() {
        let mut de_esser = DeEsser::new(SAMPLE_RATE);
        let original = voice_with_hiss(1024);
        let mut samples = original.clone();
        de_esser.process_in_place(&mut samples);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_streaming_matches_whole_array() {
        let mut de_esser = DeEsser::new(SAMPLE_RATE);
        de_esser.set_enabled(true);
        de_esser.params().set_reduction_db(12.0);

        let original = voice_with_hiss(1024);
        let mut streamed = original.clone();
        de_esser.process_in_place(&mut streamed);

        let mut whole = original.clone();
        apply_de_esser(&mut whole, SAMPLE_RATE, 4000.0, 10000.0, 12.0).unwrap();

        for (a, b) in streamed.iter().zip(&whole) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_reference_dft_kernel() {
        let mut de_esser: DeEsser<NaiveDft> =
            DeEsser::with_transform(SAMPLE_RATE, Ok(NaiveDft::new(64)));
        de_esser.set_enabled(true);
        de_esser.params().set_reduction_db(0.0);

        let original: Vec<f32> = (0..64).map(|i| ((i * 7) % 13) as f32 / 13.0 - 0.5).collect();
        let mut samples = original.clone();
        de_esser.process_in_place(&mut samples);

        for (y, x) in samples.iter().zip(&original) {
            assert!((y - x).abs() < 1e-4);
        }
    }

    #[test]
    fn test_failed_transform_passes_through() {
        let mut de_esser: DeEsser<NaiveDft> =
            DeEsser::with_transform(SAMPLE_RATE, Err(DspError::InvalidTransformLength(0)));
        de_esser.set_enabled(true);
        assert!(!de_esser.is_enabled());
        assert!(!de_esser.is_available());

        let original = voice_with_hiss(256);
        let mut samples = original.clone();
        de_esser.process_in_place(&mut samples);
        assert_eq!(samples, original);
    }
}
