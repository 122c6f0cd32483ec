// ============================================
// File: crates/burrow-client/src/buffer.rs
// ============================================
//! # Outbound Buffer
//!
//! ## Creation Reason
//! Packets read from the adapter while the tunnel is down would
//! otherwise be lost. They are parked here and flushed once `Tunneling`
//! is reached again, unless they have gone stale.
//!
//! ## Main Functionality
//! ```text
//!   push(pkt, now) ──► [ (t0,p0) (t1,p1) ... (tn,pn) ] ──► drain(now)
//!                       oldest               newest        fresh only
//!
//!   full  → oldest dropped
//!   stale → (now - t) > max_age, dropped at drain time
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Not thread-safe; owned by the connection driver
//! - Every drop is reported back so the caller can count it
//!
//! ## Last Modified
//! v0.1.0 - Initial outbound buffer

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;

/// Bounded, age-limited FIFO of outbound packets.
#[derive(Debug)]
pub struct OutboundBuffer {
    queue: VecDeque<(Instant, Bytes)>,
    capacity: usize,
    max_age: Duration,
}

impl OutboundBuffer {
    /// Creates a buffer holding at most `capacity` packets for at most
    /// `max_age`. A zero capacity is treated as 1.
    #[must_use]
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            max_age,
        }
    }

    /// Parks `packet`. Returns the number of packets dropped to make room.
    pub fn push(&mut self, packet: Bytes, now: Instant) -> usize {
        let mut dropped = self.evict_stale(now);
        while self.queue.len() >= self.capacity {
            self.queue.pop_front();
            dropped += 1;
        }
        self.queue.push_back((now, packet));
        dropped
    }

    /// Removes everything, returning the fresh packets in arrival order
    /// and the number of stale ones discarded.
    pub fn drain(&mut self, now: Instant) -> (Vec<Bytes>, usize) {
        let stale = self.evict_stale(now);
        let fresh = self.queue.drain(..).map(|(_, packet)| packet).collect();
        (fresh, stale)
    }

    /// Number of parked packets, stale or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn evict_stale(&mut self, now: Instant) -> usize {
        let mut evicted = 0;
        while self
            .queue
            .front()
            .is_some_and(|(at, _)| now.saturating_duration_since(*at) > self.max_age)
        {
            self.queue.pop_front();
            evicted += 1;
        }
        evicted
    }
}
