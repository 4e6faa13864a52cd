//! Frequency Transform Engine
//!
//! The spectral effects only ever need two operations: a real frame to its
//! half spectrum, and a half spectrum back to a real frame. They reach the
//! FFT library through the narrow [`Transform`] trait so each effect can be
//! exercised against a reference DFT in tests.
//!
//! # Scaling
//!
//! Like most C FFT libraries, neither direction normalizes: `inverse(forward(x))`
//! yields `x * size()`. Callers divide by the transform length themselves.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::DspError;

/// Single-precision complex bin
pub type Complex32 = Complex<f32>;

/// Forward/inverse real transform of a fixed length
///
/// # Real-time Safety Contract
///
/// `forward()` and `inverse()` are called from the processing thread on every
/// block. Implementations must not allocate inside them.
pub trait Transform: Send {
    /// Transform length in samples (fixed for the lifetime of the value)
    fn size(&self) -> usize;

    /// Number of non-redundant bins: `size / 2 + 1`
    fn bins(&self) -> usize {
        self.size() / 2 + 1
    }

    /// Real frame -> half spectrum
    ///
    /// Input shorter than `size()` is zero-padded, longer input is truncated.
    /// Writes `min(bins(), spectrum.len())` bins.
    fn forward(&mut self, input: &[f32], spectrum: &mut [Complex32]);

    /// Half spectrum -> real frame (unnormalized)
    ///
    /// The negative-frequency half is rebuilt as the conjugate mirror of the
    /// positive half. Missing bins are treated as zero. Writes
    /// `min(size(), output.len())` samples.
    fn inverse(&mut self, spectrum: &[Complex32], output: &mut [f32]);
}

/// `rustfft`-backed transform owning its plans and working buffers
///
/// Everything the transform needs is acquired in [`FftTransform::new`] and
/// released when the value is dropped, including when construction fails
/// half-way through.
pub struct FftTransform {
    size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl FftTransform {
    /// Plan forward and inverse transforms of `size` samples
    pub fn new(size: usize) -> Result<Self, DspError> {
        if size < 2 {
            return Err(DspError::InvalidTransformLength(size));
        }

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);

        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Ok(Self {
            size,
            forward,
            inverse,
            buffer: zeroed(size)?,
            scratch: zeroed(scratch_len)?,
        })
    }
}

impl Transform for FftTransform {
    fn size(&self) -> usize {
        self.size
    }

    fn forward(&mut self, input: &[f32], spectrum: &mut [Complex32]) {
        let copied = input.len().min(self.size);
        for (slot, &sample) in self.buffer.iter_mut().zip(&input[..copied]) {
            *slot = Complex32::new(sample, 0.0);
        }
        self.buffer[copied..].fill(Complex32::default());

        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let bins = self.bins().min(spectrum.len());
        spectrum[..bins].copy_from_slice(&self.buffer[..bins]);
    }

    fn inverse(&mut self, spectrum: &[Complex32], output: &mut [f32]) {
        let size = self.size;
        let bins = self.bins();

        self.buffer[0] = spectrum.first().copied().unwrap_or_default();
        for k in 1..size {
            self.buffer[k] = if k < bins {
                spectrum.get(k).copied().unwrap_or_default()
            } else {
                spectrum.get(size - k).copied().unwrap_or_default().conj()
            };
        }

        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (out, bin) in output.iter_mut().zip(&self.buffer) {
            *out = bin.re;
        }
    }
}

/// Allocate a zeroed complex buffer, reporting failure instead of aborting
fn zeroed(len: usize) -> Result<Vec<Complex32>, DspError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| DspError::AllocationFailed { len })?;
    buffer.resize(len, Complex32::default());
    Ok(buffer)
}

/// Periodic Hann window
///
/// The periodic form (denominator `size`, not `size - 1`) sums to exactly 1.0
/// at 50% overlap, so overlap-add reconstruction is transparent.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|n| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / size as f32).cos())
        })
        .collect()
}
