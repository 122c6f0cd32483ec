// ============================================
// File: crates/burrow-core/src/lifecycle/monitor.rs
// ============================================
//! # Decode Authentication-Failure Monitor
//!
//! A burst of `AuthenticationFailed` frames may mean the peers' keys have
//! drifted apart. What to do about it is a policy choice: alert only, or
//! feed `Event::KeyDesync` to the state machine and reconnect.
//!
//! ```text
//!   failures ──► sliding window (threshold in window) ──► verdict
//!                                                       ├─ Alert
//!                                                       └─ ForceReconnect
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default number of failures that trips the monitor.
pub const DEFAULT_AUTH_FAILURE_THRESHOLD: u32 = 16;

/// Default window the failures are counted in.
pub const DEFAULT_AUTH_FAILURE_WINDOW: Duration = Duration::from_secs(10);

/// Reaction to a burst of decode authentication failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthFailurePolicy {
    /// Log a warning and keep the session.
    #[default]
    AlertOnly,
    /// Tear the connection down and re-authenticate.
    ForceReconnect,
}

/// What the caller should do after a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorVerdict {
    /// Below threshold.
    Quiet,
    /// Threshold crossed; warn.
    Alert {
        /// Failures seen inside the window
        failures: u32,
    },
    /// Threshold crossed; reconnect.
    ForceReconnect {
        /// Failures seen inside the window
        failures: u32,
    },
}

/// Sliding-window counter of decode authentication failures.
#[derive(Debug, Clone)]
pub struct AuthFailureMonitor {
    policy: AuthFailurePolicy,
    threshold: u32,
    window: Duration,
    failures: VecDeque<Instant>,
}

impl AuthFailureMonitor {
    /// Creates a monitor. A zero threshold is treated as 1.
    #[must_use]
    pub fn new(policy: AuthFailurePolicy, threshold: u32, window: Duration) -> Self {
        Self {
            policy,
            threshold: threshold.max(1),
            window,
            failures: VecDeque::new(),
        }
    }

    /// Configured policy.
    #[must_use]
    pub const fn policy(&self) -> AuthFailurePolicy {
        self.policy
    }

    /// Records one failure at `now`.
    ///
    /// Once the threshold trips, the window starts over so one burst
    /// yields one verdict.
    pub fn record(&mut self, now: Instant) -> MonitorVerdict {
        while self
            .failures
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= self.window)
        {
            self.failures.pop_front();
        }
        self.failures.push_back(now);

        let failures = u32::try_from(self.failures.len()).unwrap_or(u32::MAX);
        if failures < self.threshold {
            return MonitorVerdict::Quiet;
        }
        self.failures.clear();
        match self.policy {
            AuthFailurePolicy::AlertOnly => MonitorVerdict::Alert { failures },
            AuthFailurePolicy::ForceReconnect => MonitorVerdict::ForceReconnect { failures },
        }
    }

    /// Forgets all recorded failures.
    pub fn reset(&mut self) {
        self.failures.clear();
    }
}

impl Default for AuthFailureMonitor {
    fn default() -> Self {
        Self::new(
            AuthFailurePolicy::default(),
            DEFAULT_AUTH_FAILURE_THRESHOLD,
            DEFAULT_AUTH_FAILURE_WINDOW,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_after_threshold() {
        let mut monitor = AuthFailureMonitor::new(
            AuthFailurePolicy::AlertOnly,
            3,
            Duration::from_secs(10),
        );
        let t0 = Instant::now();
        assert_eq!(monitor.record(t0), MonitorVerdict::Quiet);
        assert_eq!(monitor.record(t0), MonitorVerdict::Quiet);
        assert_eq!(monitor.record(t0), MonitorVerdict::Alert { failures: 3 });
        assert_eq!(monitor.record(t0), MonitorVerdict::Quiet);
    }

    #[test]
    fn test_old_failures_fall_out_of_window() {
        let mut monitor = AuthFailureMonitor::new(
            AuthFailurePolicy::ForceReconnect,
            2,
            Duration::from_secs(10),
        );
        let t0 = Instant::now();
        assert_eq!(monitor.record(t0), MonitorVerdict::Quiet);
        assert_eq!(
            monitor.record(t0 + Duration::from_secs(11)),
            MonitorVerdict::Quiet
        );
        assert_eq!(
            monitor.record(t0 + Duration::from_secs(12)),
            MonitorVerdict::ForceReconnect { failures: 2 }
        );
    }

    #[test]
    fn test_defaults() {
        let monitor = AuthFailureMonitor::default();
        assert_eq!(monitor.policy(), AuthFailurePolicy::AlertOnly);
        assert_eq!(monitor.threshold, DEFAULT_AUTH_FAILURE_THRESHOLD);
    }
}
