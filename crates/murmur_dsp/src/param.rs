//! Lock-free parameter cells
//!
//! Control surfaces write parameters from their own thread while the
//! processing thread reads them once per block. Every cell is a plain
//! atomic, so neither side ever takes a lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` stored as its bit pattern in an `AtomicU32`
///
/// Rust pattern: AtomicF32 doesn't exist, so we use bit-casting.
#[derive(Debug)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    /// Relaxed ordering is enough: each parameter is an independent value
    /// and the reader only needs to see some recent write.
    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Clamp that maps NaN to the lower bound instead of propagating it
#[inline]
pub(crate) fn clamp_finite(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}
