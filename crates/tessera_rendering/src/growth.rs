//! # Atlas Growth Policy
//!
//! After a sweep, if the bytes the active meshes asked for exceed
//! `threshold × capacity`, growth to `capacity + factor × capacity` is
//! scheduled. The orchestrator applies it before the next sweep, resizing the
//! atlas and recreating every ring slot.
//!
//! Demand counts skipped meshes too, so a mesh that overflowed keeps pushing
//! the capacity up until it fits.

use crate::config::GrowthConfig;

/// Decides when the atlas and ring grow.
#[derive(Debug, Clone)]
pub struct GrowthPolicy {
    threshold: f64,
    factor: f64,
    pending: Option<u64>,
}

impl GrowthPolicy {
    /// Creates a policy from configuration.
    #[must_use]
    pub fn new(config: &GrowthConfig) -> Self {
        Self {
            threshold: config.threshold,
            factor: config.factor,
            pending: None,
        }
    }

    /// Capacity after one growth step from `capacity`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn grown_capacity(&self, capacity: u64) -> u64 {
        let step = (capacity as f64 * self.factor).ceil() as u64;
        capacity + step.max(1)
    }

    /// Checks a sweep's demand against `capacity`, scheduling growth if the
    /// threshold is crossed. Returns the pending target capacity, if any.
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(&mut self, demanded: u64, capacity: u64) -> Option<u64> {
        if demanded as f64 > self.threshold * capacity as f64 {
            let target = self.grown_capacity(capacity);
            if self.pending.map_or(true, |pending| pending < target) {
                tracing::debug!(demanded, capacity, target, "atlas growth scheduled");
                self.pending = Some(target);
            }
        }
        self.pending
    }

    /// Growth scheduled but not yet applied.
    #[must_use]
    pub fn pending(&self) -> Option<u64> {
        self.pending
    }

    /// Takes the scheduled growth, leaving none pending.
    pub fn take_pending(&mut self) -> Option<u64> {
        self.pending.take()
    }
}
