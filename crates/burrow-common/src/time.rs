// ============================================
// File: crates/burrow-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! Session expiry, key-rotation grace windows, keepalive ledgers and the
//! outbound reconnect buffer all depend on "now". Routing every read of the
//! clock through [`Clock`] lets tests drive those paths with a
//! [`ManualClock`] instead of sleeping.
//!
//! ## Main Functionality
//! - `Clock`: monotonic + wall-clock source
//! - `SystemClock`: production clock
//! - `ManualClock`: test clock advanced explicitly
//! - `AtomicInstant`: lock-free last-activity timestamp
//! - `coarse_timestamp`: 24-bit coarse time used in packet nonces
//!
//! ## ⚠️ Important Note for Next Developer
//! - `AtomicInstant` stores nanoseconds since a process-wide reference
//!   instant; instants earlier than the reference clamp to the reference
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

// ============================================
// Constants
// ============================================

/// Granularity of the coarse timestamp carried in packet nonces (seconds).
pub const COARSE_TIMESTAMP_GRANULARITY_SECS: u64 = 16;

/// Mask for the 24-bit coarse timestamp.
pub const COARSE_TIMESTAMP_MASK: u32 = 0x00FF_FFFF;

// ============================================
// Clock
// ============================================

/// Source of time for the engine.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic now.
    fn now(&self) -> Instant;

    /// Seconds since the Unix epoch.
    fn unix_secs(&self) -> u64;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    /// Returns the system clock as a shared handle.
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_secs(&self) -> u64 {
        unix_timestamp()
    }
}

/// Clock that only moves when told to.
///
/// # Example
/// ```
/// use burrow_common::time::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(15));
/// assert_eq!(clock.now() - start, Duration::from_secs(15));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    unix_origin: u64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            unix_origin: unix_timestamp(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Total time advanced since creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    fn unix_secs(&self) -> u64 {
        self.unix_origin + self.offset.lock().as_secs()
    }
}

// ============================================
// AtomicInstant
// ============================================

/// Lock-free `Instant` cell.
///
/// Packet handlers touch `last_activity` on every frame; cleanup reads it
/// from another task. Relaxed ordering is enough since nothing else is
/// published through it.
#[derive(Debug)]
pub struct AtomicInstant {
    nanos: AtomicU64,
}

impl AtomicInstant {
    fn reference() -> Instant {
        static REFERENCE: OnceLock<Instant> = OnceLock::new();
        *REFERENCE.get_or_init(Instant::now)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_nanos(instant: Instant) -> u64 {
        instant
            .checked_duration_since(Self::reference())
            .map_or(0, |d| d.as_nanos() as u64)
    }

    /// Creates a cell holding `instant`.
    #[must_use]
    pub fn from_instant(instant: Instant) -> Self {
        Self {
            nanos: AtomicU64::new(Self::to_nanos(instant)),
        }
    }

    /// Loads the stored instant.
    #[must_use]
    pub fn load(&self) -> Instant {
        Self::reference() + Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }

    /// Stores a new instant.
    pub fn store(&self, instant: Instant) {
        self.nanos.store(Self::to_nanos(instant), Ordering::Relaxed);
    }

    /// Time elapsed between the stored instant and `now`.
    #[must_use]
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.load())
    }
}

impl Clone for AtomicInstant {
    fn clone(&self) -> Self {
        Self {
            nanos: AtomicU64::new(self.nanos.load(Ordering::Relaxed)),
        }
    }
}

// ============================================
// Wall clock helpers
// ============================================

/// Current Unix timestamp in seconds (0 if the system clock is before 1970).
#[must_use]
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// 24-bit coarse timestamp derived from Unix seconds.
///
/// Wraps roughly every 8.5 years; only used to decorrelate nonces across
/// process restarts, never for ordering.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn coarse_timestamp(unix_secs: u64) -> u32 {
    ((unix_secs / COARSE_TIMESTAMP_GRANULARITY_SECS) as u32) & COARSE_TIMESTAMP_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        let u0 = clock.unix_secs();

        clock.advance(Duration::from_secs(30));

        assert_eq!(clock.now() - t0, Duration::from_secs(30));
        assert_eq!(clock.unix_secs() - u0, 30);
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
    }

    #[test]
    fn test_atomic_instant_store_load() {
        let clock = ManualClock::new();
        let cell = AtomicInstant::from_instant(clock.now());

        clock.advance(Duration::from_secs(5));
        assert_eq!(cell.elapsed_at(clock.now()), Duration::from_secs(5));

        cell.store(clock.now());
        assert_eq!(cell.elapsed_at(clock.now()), Duration::ZERO);
    }

    #[test]
    fn test_atomic_instant_elapsed_never_negative() {
        let clock = ManualClock::new();
        let cell = AtomicInstant::from_instant(clock.now() + Duration::from_secs(10));
        assert_eq!(cell.elapsed_at(clock.now()), Duration::ZERO);
    }

    #[test]
    fn test_coarse_timestamp_fits_24_bits() {
        assert_eq!(coarse_timestamp(0), 0);
        assert_eq!(coarse_timestamp(32), 2);
        assert!(coarse_timestamp(u64::MAX) <= COARSE_TIMESTAMP_MASK);
    }
}
