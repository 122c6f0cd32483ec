// ============================================
// File: crates/burrow-core/src/lifecycle/mod.rs
// ============================================
//! # Connection Lifecycle
//!
//! ## Main Functionality
//! - [`state`]: the pure `transition` function and its types
//! - [`backoff`]: capped exponential backoff with jitter
//! - [`ledger`]: keepalive bookkeeping
//! - [`monitor`]: decode authentication-failure policy
//!
//! The client driver owns a `MachineState`, feeds it events from timers
//! and I/O, and executes the returned `Action`.
//!
//! ## Last Modified
//! v0.1.0 - Initial lifecycle module

pub mod backoff;
pub mod ledger;
pub mod monitor;
pub mod state;

use std::time::Duration;

pub use backoff::BackoffPolicy;
pub use ledger::KeepaliveLedger;
pub use monitor::{AuthFailureMonitor, AuthFailurePolicy, MonitorVerdict};
pub use state::{transition, Action, CloseReason, ConnectionState, Event, MachineState};

/// Default keepalive interval.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Default misses before `Degraded`.
pub const DEFAULT_DEGRADE_AFTER_MISSES: u32 = 2;

/// Default misses before `Reconnecting`.
pub const DEFAULT_RECONNECT_AFTER_MISSES: u32 = 3;

/// Default reconnect cycles before a persistent failure is reported.
pub const DEFAULT_MAX_CONSECUTIVE_CYCLES: u32 = 5;

/// Constants driving [`transition`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleConfig {
    /// Time between keepalive ticks (used by the driver).
    pub keepalive_interval: Duration,
    /// Missed pongs that demote `Tunneling` to `Degraded`.
    pub degrade_after_misses: u32,
    /// Missed pongs that trigger a reconnect.
    pub reconnect_after_misses: u32,
    /// Backoff schedule.
    pub backoff: BackoffPolicy,
    /// Cycles tolerated before `persistent_failure` is raised.
    pub max_consecutive_cycles: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            degrade_after_misses: DEFAULT_DEGRADE_AFTER_MISSES,
            reconnect_after_misses: DEFAULT_RECONNECT_AFTER_MISSES,
            backoff: BackoffPolicy::default(),
            max_consecutive_cycles: DEFAULT_MAX_CONSECUTIVE_CYCLES,
        }
    }
}
