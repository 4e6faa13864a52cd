//! Murmur DSP - Voice Cleanup Effects
//!
//! This crate provides the four effects of the Murmur voice chain:
//! - Spectral noise gate with banded energy detection
//! - Three-band overlap-add spectral equalizer
//! - Frame-wise spectral de-esser
//! - Time-domain peak limiter
//!
//! # Architecture
//!
//! Effects are created once with a fixed sample rate and transform size and
//! are then driven block by block from a single processing thread. Each one
//! hands out an `Arc` parameter handle whose setters are plain atomic stores,
//! so control surfaces never share a lock with the audio path.
//!
//! Spectral effects reach the FFT only through the [`Transform`] trait.

mod analysis;
mod de_esser;
mod effect;
mod envelope;
mod eq;
mod error;
mod limiter;
mod noise_gate;
mod param;
mod transform;

pub use analysis::{peak, rms, BandEnergies, SpectrumMeter};
pub use de_esser::{apply_de_esser, db_to_gain, DeEsser, DeEsserParams};
pub use effect::AudioEffect;
pub use envelope::{smoothing_coeff, EnvelopeState};
pub use eq::{smooth_gain, EqParams, ThreeBandEq};
pub use error::DspError;
pub use limiter::{Limiter, LimiterParams};
pub use noise_gate::{GateParams, NoiseGate};
pub use param::AtomicF32;
pub use transform::{hann_window, Complex32, FftTransform, Transform};

/// Per-effect constants, namespaced to avoid `DEFAULT_*` collisions
pub mod consts {
    pub mod gate {
        pub use crate::noise_gate::{
            DEFAULT_ATTACK_MS, DEFAULT_FFT_SIZE, DEFAULT_RELEASE_MS, DEFAULT_THRESHOLD, MAX_FFT_SIZE,
            NUM_BANDS,
        };
    }

    pub mod eq {
        pub use crate::eq::{
            DEFAULT_LOW_MID_CUTOFF_HZ, DEFAULT_MID_HIGH_CUTOFF_HZ, MAX_GAIN, MIN_CUTOFF_HZ,
            MIN_GAIN, NUM_BANDS,
        };
    }

    pub mod de_esser {
        pub use crate::de_esser::{
            DEFAULT_END_HZ, DEFAULT_REDUCTION_DB, DEFAULT_START_HZ, FRAME_SIZE, MAX_REDUCTION_DB,
        };
    }

    pub mod limiter {
        pub use crate::limiter::{DEFAULT_ATTACK_MS, DEFAULT_RELEASE_MS, DEFAULT_THRESHOLD};
    }

    pub mod analysis {
        pub use crate::analysis::{
            LOW_BAND_MAX_HZ, MID_BAND_MAX_HZ, SIBILANCE_END_HZ, SIBILANCE_START_HZ,
        };
    }

    pub use crate::envelope::{MIN_ATTACK_MS, MIN_RELEASE_MS};
}
