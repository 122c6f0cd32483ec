// ============================================
// File: crates/burrow-core/src/lifecycle/ledger.rs
// ============================================
//! Keepalive bookkeeping.
//!
//! Every tick sends a ping. A tick that finds the previous ping still
//! unanswered counts one miss; a pong clears the count.

use std::time::Instant;

/// Keepalive state of one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepaliveLedger {
    /// When the last ping went out.
    pub last_ping_sent: Option<Instant>,
    /// When the last pong arrived.
    pub last_pong_received: Option<Instant>,
    /// Consecutive intervals without a pong.
    pub missed_count: u32,
    outstanding: bool,
}

impl KeepaliveLedger {
    /// Fresh ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_ping_sent: None,
            last_pong_received: None,
            missed_count: 0,
            outstanding: false,
        }
    }

    /// Records a keepalive tick and the ping it sends.
    pub fn on_tick(&mut self, now: Instant) {
        if self.outstanding {
            self.missed_count = self.missed_count.saturating_add(1);
        }
        self.last_ping_sent = Some(now);
        self.outstanding = true;
    }

    /// Records a pong.
    pub fn on_pong(&mut self, now: Instant) {
        self.last_pong_received = Some(now);
        self.missed_count = 0;
        self.outstanding = false;
    }

    /// Whether a ping is awaiting its pong.
    #[must_use]
    pub const fn has_outstanding_ping(&self) -> bool {
        self.outstanding
    }

    /// Clears everything.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_misses_count_unanswered_pings() {
        let t0 = Instant::now();
        let mut ledger = KeepaliveLedger::new();
        ledger.on_tick(t0);
        assert_eq!(ledger.missed_count, 0);
        ledger.on_tick(t0 + Duration::from_secs(15));
        ledger.on_tick(t0 + Duration::from_secs(30));
        assert_eq!(ledger.missed_count, 2);

        ledger.on_pong(t0 + Duration::from_secs(31));
        assert_eq!(ledger.missed_count, 0);
        assert!(!ledger.has_outstanding_ping());

        ledger.on_tick(t0 + Duration::from_secs(45));
        assert_eq!(ledger.missed_count, 0);
    }

    #[test]
    fn test_reset() {
        let mut ledger = KeepaliveLedger::new();
        ledger.on_tick(Instant::now());
        ledger.on_tick(Instant::now());
        ledger.reset();
        assert_eq!(ledger, KeepaliveLedger::new());
    }
}
