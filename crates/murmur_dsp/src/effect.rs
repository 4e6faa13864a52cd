//! Effect Capability
//!
//! The contract shared by the stateful streaming effects (gate, EQ, limiter).
//! The processing chain is a fixed list of concrete effects, so the trait is
//! used for its shared behaviour and for generic test helpers, not for
//! dynamic registration.

use std::sync::atomic::{AtomicBool, Ordering};

/// A stateful effect driven by the processing thread
///
/// # Real-time Safety Contract
///
/// Implementors MUST follow these rules in `process()`:
/// - NO heap allocations (no Vec::push, no Box::new, no String)
/// - NO syscalls (no file I/O, no network, no mutex locks)
/// - NO unbounded loops
/// - Constant or O(n) time complexity where n = block length
pub trait AudioEffect: Send {
    /// Transform exactly `input.len()` mono samples into `output`
    ///
    /// `output` must be at least as long as `input`.
    fn process(&mut self, input: &[f32], output: &mut [f32]);

    /// Restore all cross-call state to its silent / unity default
    fn reset(&mut self);

    /// Snapshot of the enabled flag, safe to read from any thread
    fn is_enabled(&self) -> bool;

    /// Store the enabled flag without touching processing state
    fn store_enabled(&self, enabled: bool);

    /// Human-readable name for logs and the control surface
    fn name(&self) -> &'static str;

    /// Toggle the effect; disabling also clears state so nothing stale
    /// survives until the next enable
    fn set_enabled(&mut self, enabled: bool) {
        self.store_enabled(enabled);
        if !enabled {
            self.reset();
        }
    }
}

/// Enabled flag shared between a parameter handle and the processing thread
///
/// Disabling leaves a reset request behind that stays set until the processing
/// thread takes it, so an off/on pair landing between two blocks still clears
/// the effect's state before the next enabled block.
#[derive(Debug, Default)]
pub(crate) struct EnableFlag {
    enabled: AtomicBool,
    reset_pending: AtomicBool,
}

impl EnableFlag {
    pub(crate) fn set(&self, enabled: bool) {
        if !enabled {
            self.reset_pending.store(true, Ordering::Release);
        }
        self.enabled.store(enabled, Ordering::Release);
    }

    #[inline]
    pub(crate) fn get(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Clear and return the pending reset request
    #[inline]
    pub(crate) fn take_reset(&self) -> bool {
        self.reset_pending.swap(false, Ordering::AcqRel)
    }
}

/// Copy `input` to `output` unchanged
#[inline]
pub(crate) fn pass_through(input: &[f32], output: &mut [f32]) {
    let n = input.len().min(output.len());
    output[..n].copy_from_slice(&input[..n]);
}
