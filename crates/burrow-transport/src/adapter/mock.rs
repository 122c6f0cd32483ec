// ============================================
// File: crates/burrow-transport/src/adapter/mock.rs
// ============================================
//! # Mock Virtual Adapter
//!
//! ## Creation Reason
//! In-memory stand-in for a TUN interface so the data plane can be
//! driven and observed from tests without privileges.
//!
//! ## Usage in Tests
//! ```ignore
//! let adapter = MockAdapter::new("mock0", 1420);
//! adapter.inject_packet(Bytes::from_static(b"outbound ip packet"));
//! let written = adapter.next_written().await;
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Queues are bounded; writes beyond the bound fail like a full device
//!
//! ## Last Modified
//! v0.1.0 - Initial mock adapter

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::VirtualAdapter;

// ============================================
// Constants
// ============================================

/// Maximum number of packets queued in either direction.
const MAX_QUEUE_SIZE: usize = 4096;

// ============================================
// MockAdapter
// ============================================

/// Mock virtual adapter with injectable reads and captured writes.
pub struct MockAdapter {
    name: String,
    mtu: u16,
    /// Packets the engine will read (injected by tests)
    read_queue: Mutex<VecDeque<Bytes>>,
    /// Packets the engine wrote (captured for tests)
    write_queue: Mutex<VecDeque<Bytes>>,
    read_notify: Notify,
    write_notify: Notify,
    closed: AtomicBool,
}

impl MockAdapter {
    /// Creates an empty adapter.
    #[must_use]
    pub fn new(name: impl Into<String>, mtu: u16) -> Self {
        Self {
            name: name.into(),
            mtu,
            read_queue: Mutex::new(VecDeque::new()),
            write_queue: Mutex::new(VecDeque::new()),
            read_notify: Notify::new(),
            write_notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Queues a packet for the next `read_packet`.
    ///
    /// Returns `false` if the queue is full.
    pub fn inject_packet(&self, packet: Bytes) -> bool {
        let mut queue = self.read_queue.lock();
        if queue.len() >= MAX_QUEUE_SIZE {
            return false;
        }
        queue.push_back(packet);
        drop(queue);
        self.read_notify.notify_one();
        true
    }

    /// Takes every packet written so far.
    #[must_use]
    pub fn take_written(&self) -> Vec<Bytes> {
        self.write_queue.lock().drain(..).collect()
    }

    /// Waits for the next written packet.
    pub async fn next_written(&self) -> Bytes {
        loop {
            let notified = self.write_notify.notified();
            if let Some(packet) = self.write_queue.lock().pop_front() {
                return packet;
            }
            notified.await;
        }
    }

    /// Packets waiting to be read.
    #[must_use]
    pub fn pending_read_count(&self) -> usize {
        self.read_queue.lock().len()
    }

    /// Packets written and not yet taken.
    #[must_use]
    pub fn written_count(&self) -> usize {
        self.write_queue.lock().len()
    }

    /// Makes later reads and writes fail with `AdapterClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.read_notify.notify_waiters();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(TransportError::AdapterClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VirtualAdapter for MockAdapter {
    async fn read_packet(&self) -> Result<Bytes> {
        loop {
            let notified = self.read_notify.notified();
            self.ensure_open()?;
            if let Some(packet) = self.read_queue.lock().pop_front() {
                return Ok(packet);
            }
            notified.await;
        }
    }

    async fn write_packet(&self, packet: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut queue = self.write_queue.lock();
        if queue.len() >= MAX_QUEUE_SIZE {
            return Err(TransportError::AdapterWriteFailed {
                reason: "write queue full".into(),
            });
        }
        queue.push_back(Bytes::copy_from_slice(packet));
        drop(queue);
        self.write_notify.notify_waiters();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mtu(&self) -> u16 {
        self.mtu
    }
}

impl fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockAdapter")
            .field("name", &self.name)
            .field("mtu", &self.mtu)
            .field("pending_reads", &self.pending_read_count())
            .field("written_packets", &self.written_count())
            .finish()
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new("mock0", 1420)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_inject_then_read() {
        let adapter = MockAdapter::default();
        assert!(adapter.inject_packet(Bytes::from_static(b"packet 1")));
        assert!(adapter.inject_packet(Bytes::from_static(b"packet 2")));
        assert_eq!(adapter.pending_read_count(), 2);

        assert_eq!(&adapter.read_packet().await.unwrap()[..], b"packet 1");
        assert_eq!(&adapter.read_packet().await.unwrap()[..], b"packet 2");
        assert_eq!(adapter.pending_read_count(), 0);
    }

    #[tokio::test]
    async fn test_read_waits_for_injection() {
        let adapter = Arc::new(MockAdapter::default());
        let reader = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.read_packet().await.unwrap() })
        };
        tokio::task::yield_now().await;
        adapter.inject_packet(Bytes::from_static(b"late"));
        assert_eq!(&reader.await.unwrap()[..], b"late");
    }

    #[tokio::test]
    async fn test_write_capture() {
        let adapter = MockAdapter::new("mock1", 1400);
        adapter.write_packet(b"a").await.unwrap();
        adapter.write_packet(b"b").await.unwrap();
        assert_eq!(adapter.written_count(), 2);
        assert_eq!(&adapter.next_written().await[..], b"a");
        let rest = adapter.take_written();
        assert_eq!(rest, vec![Bytes::from_static(b"b")]);
        assert_eq!(adapter.mtu(), 1400);
        assert_eq!(adapter.name(), "mock1");
    }

    #[tokio::test]
    async fn test_close_fails_reads() {
        let adapter = MockAdapter::default();
        adapter.close();
        assert!(matches!(
            adapter.read_packet().await,
            Err(TransportError::AdapterClosed)
        ));
        assert!(adapter.write_packet(b"x").await.is_err());
    }
}
