//! Volume gate: turns a normalised volume sample into an "active" flag.
//!
//! The gate has no memory: it answers for the sample it is given and
//! nothing else. Hysteresis, where wanted, is layered on top with a
//! [`CooldownTimer`](crate::cooldown::CooldownTimer).

use aura_core::SettingsError;

/// Whether `sample` is strictly above `threshold`.
#[must_use]
pub const fn evaluate(sample: f32, threshold: f32) -> bool {
    sample > threshold
}

/// A volume threshold validated for the normalised `[0, 1)` domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeGate {
    threshold: f32,
}

impl VolumeGate {
    /// Create a gate, rejecting thresholds outside `[0, 1)`.
    pub fn new(threshold: f32) -> Result<Self, SettingsError> {
        if !(0.0..1.0).contains(&threshold) {
            return Err(SettingsError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    /// Evaluate a sample against this gate's threshold.
    #[must_use]
    pub const fn is_active(&self, sample: f32) -> bool {
        evaluate(sample, self.threshold)
    }
}
