// ============================================
// File: crates/burrow-core/src/lifecycle/backoff.rs
// ============================================
//! Capped exponential backoff.
//!
//! The pure transition function only ever emits the nominal delay; the
//! driver applies jitter with [`BackoffPolicy::with_jitter`].

use std::time::Duration;

use rand::Rng;

/// Default first delay.
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Default ceiling.
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(15);

/// Default jitter, as a fraction of the nominal delay.
pub const DEFAULT_JITTER_RATIO: f64 = 0.2;

/// Backoff schedule: `initial * 2^attempt`, capped at `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay of attempt 0.
    pub initial: Duration,
    /// Upper bound of the nominal delay.
    pub ceiling: Duration,
    /// Maximum extra delay as a fraction of the nominal delay.
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_BACKOFF_INITIAL,
            ceiling: DEFAULT_BACKOFF_CEILING,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl BackoffPolicy {
    /// Nominal delay for the given zero-based attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .map_or(self.ceiling, |d| d.min(self.ceiling))
    }

    /// Adds up to `jitter_ratio * delay` of random extra delay.
    #[must_use]
    pub fn with_jitter<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let fraction: f64 = rng.gen_range(0.0..=self.jitter_ratio);
        delay + delay.mul_f64(fraction)
    }
}
