// ============================================
// File: crates/burrow-client/src/stats.rs
// ============================================
//! # Client Statistics
//!
//! Lock-free counters shared by the connection driver and whoever asks
//! for `statistics()`. Counters survive reconnects; `session_age` is
//! measured from the most recent successful authentication.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Client-wide traffic counters.
#[derive(Debug, Default)]
pub struct ClientStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    packets_dropped: AtomicU64,
    replays_blocked: AtomicU64,
    auth_failures: AtomicU64,
    total_reconnects: AtomicU64,
    session_started: Mutex<Option<Instant>>,
}

impl ClientStats {
    /// Records one packet sent through the tunnel.
    pub fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one packet delivered from the tunnel.
    pub fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `count` dropped packets.
    pub fn record_dropped(&self, count: usize) {
        self.packets_dropped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records a frame rejected as a replay.
    pub fn record_replay(&self) {
        self.replays_blocked.fetch_add(1, Ordering::Relaxed);
        self.record_dropped(1);
    }

    /// Records a frame that failed authentication.
    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
        self.record_dropped(1);
    }

    /// Records the start of a reconnect cycle.
    pub fn record_reconnect(&self) {
        self.total_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks a new session as established at `now`.
    pub fn session_started(&self, now: Instant) {
        *self.session_started.lock() = Some(now);
    }

    /// Forgets the current session.
    pub fn session_ended(&self) {
        *self.session_started.lock() = None;
    }

    /// Copies the counters out.
    #[must_use]
    pub fn snapshot(&self, now: Instant) -> Statistics {
        Statistics {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            replays_blocked: self.replays_blocked.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            total_reconnects: self.total_reconnects.load(Ordering::Relaxed),
            session_age: self
                .session_started
                .lock()
                .map(|started| now.saturating_duration_since(started)),
        }
    }
}

/// Point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Statistics {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub replays_blocked: u64,
    pub auth_failures: u64,
    pub total_reconnects: u64,
    /// Time since the current session was issued; `None` while down.
    pub session_age: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = ClientStats::default();
        stats.record_sent(100);
        stats.record_sent(50);
        stats.record_received(70);
        stats.record_replay();
        stats.record_auth_failure();
        stats.record_dropped(3);

        let snap = stats.snapshot(Instant::now());
        assert_eq!(snap.bytes_sent, 150);
        assert_eq!(snap.packets_sent, 2);
        assert_eq!(snap.bytes_received, 70);
        assert_eq!(snap.replays_blocked, 1);
        assert_eq!(snap.auth_failures, 1);
        assert_eq!(snap.packets_dropped, 5);
    }

    #[test]
    fn test_session_age_follows_session() {
        let stats = ClientStats::default();
        let t0 = Instant::now();
        assert_eq!(stats.snapshot(t0).session_age, None);

        stats.session_started(t0);
        let later = t0 + Duration::from_secs(42);
        assert_eq!(stats.snapshot(later).session_age, Some(Duration::from_secs(42)));

        stats.session_ended();
        assert_eq!(stats.snapshot(later).session_age, None);
    }
}
