// ============================================
// File: crates/burrow-core/src/replay.rs
// ============================================
//! # Replay Guard
//!
//! ## Creation Reason
//! Rejects duplicated or excessively delayed frames without requiring the
//! transport to deliver in order.
//!
//! ## Window Layout
//! ```text
//!            highest
//!               │
//!   ... 63 62 ... 2 1 0     bit i set  =>  (highest - i) already seen
//!   └──────── 64 ────────┘
//!
//!   seq >  highest            shift left by (seq - highest), mark bit 0
//!   highest - seq < 64        accept if bit unmarked, then mark
//!   highest - seq >= 64       too old, reject
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `check` never mutates; decode calls it before authentication and
//!   `accept` only after the tag verified. Otherwise a forged frame could
//!   slide the window and lock out genuine traffic.
//! - One guard per direction per key epoch. Counters restart at 0 on
//!   every new epoch, so guards must not be shared across epochs.
//!
//! ## Last Modified
//! v0.1.0 - Initial replay guard

/// Width of the replay window in sequences.
pub const REPLAY_WINDOW_SIZE: u64 = 64;

/// Sliding-window replay guard.
#[derive(Debug, Clone, Default)]
pub struct ReplayGuard {
    highest: u64,
    bitmap: u64,
    started: bool,
}

impl ReplayGuard {
    /// Creates an empty guard.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            highest: 0,
            bitmap: 0,
            started: false,
        }
    }

    /// Highest sequence accepted so far, if any.
    #[must_use]
    pub const fn highest_sequence(&self) -> Option<u64> {
        if self.started {
            Some(self.highest)
        } else {
            None
        }
    }

    /// Whether `sequence` would be accepted. Does not mark it.
    #[must_use]
    pub fn check(&self, sequence: u64) -> bool {
        if !self.started || sequence > self.highest {
            return true;
        }
        let offset = self.highest - sequence;
        offset < REPLAY_WINDOW_SIZE && self.bitmap & (1u64 << offset) == 0
    }

    /// Accepts `sequence` and marks it seen.
    ///
    /// Returns `false` for sequences already marked or older than the
    /// window.
    pub fn accept(&mut self, sequence: u64) -> bool {
        if !self.started {
            self.started = true;
            self.highest = sequence;
            self.bitmap = 1;
            return true;
        }

        if sequence > self.highest {
            let shift = sequence - self.highest;
            self.bitmap = if shift >= REPLAY_WINDOW_SIZE {
                1
            } else {
                (self.bitmap << shift) | 1
            };
            self.highest = sequence;
            return true;
        }

        let offset = self.highest - sequence;
        if offset >= REPLAY_WINDOW_SIZE {
            return false;
        }
        let bit = 1u64 << offset;
        if self.bitmap & bit != 0 {
            return false;
        }
        self.bitmap |= bit;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sequence_zero_accepted() {
        let mut guard = ReplayGuard::new();
        assert_eq!(guard.highest_sequence(), None);
        assert!(guard.check(0));
        assert!(guard.accept(0));
        assert!(!guard.accept(0));
        assert_eq!(guard.highest_sequence(), Some(0));
    }

    #[test]
    fn test_in_order_and_duplicates() {
        let mut guard = ReplayGuard::new();
        for seq in 0..10 {
            assert!(guard.accept(seq));
        }
        for seq in 0..10 {
            assert!(!guard.accept(seq));
        }
    }

    #[test]
    fn test_out_of_order_within_window() {
        let mut guard = ReplayGuard::new();
        assert!(guard.accept(5));
        assert!(guard.accept(3));
        assert!(guard.accept(4));
        assert!(!guard.accept(4));
        assert!(guard.accept(1));
    }

    #[test]
    fn test_window_edge() {
        let mut guard = ReplayGuard::new();
        assert!(guard.accept(100));
        assert!(guard.check(37));
        assert!(!guard.check(36));
        assert!(guard.accept(37));
        assert!(!guard.accept(36));
    }

    #[test]
    fn test_large_jump_clears_window() {
        let mut guard = ReplayGuard::new();
        assert!(guard.accept(1));
        assert!(guard.accept(1_000));
        assert!(!guard.accept(1));
        assert!(guard.accept(999));
    }

    #[test]
    fn test_check_does_not_mutate() {
        let mut guard = ReplayGuard::new();
        assert!(guard.accept(10));
        assert!(guard.check(20));
        assert!(guard.check(20));
        assert_eq!(guard.highest_sequence(), Some(10));
        assert!(guard.accept(20));
        assert!(!guard.check(20));
    }
}
