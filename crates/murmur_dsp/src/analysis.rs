//! Block Metrics
//!
//! Level and spectral energy measurements used by meters and by the offline
//! batch runner to compare a block before and after an effect.

use crate::error::DspError;
use crate::transform::{Complex32, FftTransform, Transform};

/// Upper edge of the "low" measurement band
pub const LOW_BAND_MAX_HZ: f32 = 400.0;
/// Upper edge of the "mid" measurement band
pub const MID_BAND_MAX_HZ: f32 = 4000.0;

pub const SIBILANCE_START_HZ: f32 = 4000.0;
pub const SIBILANCE_END_HZ: f32 = 10000.0;

#[inline]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&x| (x as f64) * (x as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

#[inline]
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |max, x| max.max(x.abs()))
}

/// Spectral energy split at 400 Hz and 4 kHz
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandEnergies {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

/// Squared-magnitude energy of a block, summed over frequency ranges
///
/// Blocks shorter than the meter's frame are zero-padded; longer ones are
/// truncated. Energies are unnormalized bin sums.
pub struct SpectrumMeter<T: Transform = FftTransform> {
    transform: T,
    spectrum: Vec<Complex32>,
    sample_rate: f32,
}

impl SpectrumMeter<FftTransform> {
    pub fn new(sample_rate: f32, frame_size: usize) -> Result<Self, DspError> {
        Self::with_transform(sample_rate, FftTransform::new(frame_size)?)
    }
}

impl<T: Transform> SpectrumMeter<T> {
    pub fn with_transform(sample_rate: f32, transform: T) -> Result<Self, DspError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        let bins = transform.bins();
        Ok(Self {
            transform,
            spectrum: vec![Complex32::default(); bins],
            sample_rate,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.transform.size()
    }

    fn analyze(&mut self, samples: &[f32]) -> impl Iterator<Item = (f32, f64)> + '_ {
        self.transform.forward(samples, &mut self.spectrum);
        let bin_hz = self.sample_rate / self.transform.size() as f32;
        self.spectrum
            .iter()
            .enumerate()
            .map(move |(i, bin)| (i as f32 * bin_hz, bin.norm_sqr() as f64))
    }

    /// Energy of bins whose centre frequency lies in `[start_hz, end_hz]`
    pub fn energy_between(&mut self, samples: &[f32], start_hz: f32, end_hz: f32) -> f64 {
        self.analyze(samples)
            .filter(|&(freq, _)| freq >= start_hz && freq <= end_hz)
            .map(|(_, energy)| energy)
            .sum()
    }

    /// Low (≤400 Hz), mid (≤4 kHz) and high band energy
    pub fn bands(&mut self, samples: &[f32]) -> BandEnergies {
        self.analyze(samples)
            .fold(BandEnergies::default(), |mut acc, (freq, energy)| {
                if freq <= LOW_BAND_MAX_HZ {
                    acc.low += energy;
                } else if freq <= MID_BAND_MAX_HZ {
                    acc.mid += energy;
                } else {
                    acc.high += energy;
                }
                acc
            })
    }

    /// Energy in the 4-10 kHz sibilance range
    pub fn sibilance(&mut self, samples: &[f32]) -> f64 {
        self.energy_between(samples, SIBILANCE_START_HZ, SIBILANCE_END_HZ)
    }
}
