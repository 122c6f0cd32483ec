// ============================================
// File: crates/burrow-transport/src/memory.rs
// ============================================
//! # In-Memory Transport
//!
//! ## Creation Reason
//! Lets the full client/server stack run inside one test process: no
//! sockets, no privileges, deterministic failure injection.
//!
//! ## Main Functionality
//! - `MemoryTransport::pair`: two connected ends over bounded channels
//! - `MemoryNetwork`: address registry with `MemoryListener` and
//!   `MemoryConnector`
//! - Fault injection: refused dials and black-holed traffic
//!
//! ```text
//!  MemoryConnector ──dial("srv")──► MemoryNetwork ──► MemoryListener
//!         │                                               │
//!         ▼                                               ▼
//!  MemoryTransport ◄════════ mpsc pair ═════════► MemoryTransport
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Test support only; compiled with `cfg(test)` or the `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial in-memory transport

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::{Result, TransportError};
use crate::traits::{Connector, Listener, PeerCertificate, Transport};

/// Messages buffered per direction.
const CHANNEL_CAPACITY: usize = 1024;

// ============================================
// MemoryTransport
// ============================================

/// One end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    rx: AsyncMutex<mpsc::Receiver<Bytes>>,
    peer_certificate: Option<PeerCertificate>,
    peer_label: String,
    blackhole: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// Creates two connected ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with(Arc::new(AtomicBool::new(false)), "client", "server")
    }

    fn pair_with(blackhole: Arc<AtomicBool>, a: &str, b: &str) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let end_a = Self {
            tx: Mutex::new(Some(a_tx)),
            rx: AsyncMutex::new(a_rx),
            peer_certificate: None,
            peer_label: b.to_string(),
            blackhole: blackhole.clone(),
        };
        let end_b = Self {
            tx: Mutex::new(Some(b_tx)),
            rx: AsyncMutex::new(b_rx),
            peer_certificate: None,
            peer_label: a.to_string(),
            blackhole,
        };
        (end_a, end_b)
    }

    /// Makes this end report `cert` as the peer's certificate.
    #[must_use]
    pub fn with_peer_certificate(mut self, cert: PeerCertificate) -> Self {
        self.peer_certificate = Some(cert);
        self
    }

    fn sender(&self) -> Result<mpsc::Sender<Bytes>> {
        self.tx.lock().clone().ok_or(TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, message: &[u8]) -> Result<()> {
        let tx = self.sender()?;
        if self.blackhole.load(Ordering::Acquire) {
            return Ok(());
        }
        tx.send(Bytes::copy_from_slice(message))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<Bytes> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn peer_certificate(&self) -> Option<PeerCertificate> {
        self.peer_certificate
    }

    fn peer_addr(&self) -> String {
        self.peer_label.clone()
    }

    async fn close(&self) -> Result<()> {
        self.tx.lock().take();
        Ok(())
    }
}

// ============================================
// MemoryNetwork
// ============================================

#[derive(Debug, Default)]
struct NetworkState {
    listeners: HashMap<String, mpsc::Sender<MemoryTransport>>,
    certificates: HashMap<String, PeerCertificate>,
    refuse: bool,
    dials: u64,
}

/// Registry connecting in-memory listeners and connectors.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
    blackhole: Arc<AtomicBool>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener at `addr`, replacing any previous one.
    #[must_use]
    pub fn listen(&self, addr: &str) -> MemoryListener {
        let (tx, rx) = mpsc::channel(64);
        self.state.lock().listeners.insert(addr.to_string(), tx);
        MemoryListener {
            addr: addr.to_string(),
            incoming: AsyncMutex::new(rx),
        }
    }

    /// Connector dialing into this network.
    #[must_use]
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            network: self.clone(),
        }
    }

    /// Makes every dial fail with `ConnectFailed` while set.
    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Silently drops every message sent on any connection while set.
    pub fn set_blackhole(&self, on: bool) {
        self.blackhole.store(on, Ordering::Release);
    }

    /// Makes dialers of `addr` see `cert` as their peer certificate.
    pub fn set_certificate(&self, addr: &str, cert: PeerCertificate) {
        self.state.lock().certificates.insert(addr.to_string(), cert);
    }

    /// Number of dial attempts so far.
    #[must_use]
    pub fn dial_count(&self) -> u64 {
        self.state.lock().dials
    }

    async fn dial(&self, addr: &str) -> Result<MemoryTransport> {
        let (listener, certificate) = {
            let mut state = self.state.lock();
            state.dials += 1;
            if state.refuse {
                return Err(TransportError::connect_failed(addr, "connection refused"));
            }
            let listener = state
                .listeners
                .get(addr)
                .cloned()
                .ok_or_else(|| TransportError::connect_failed(addr, "no listener"))?;
            (listener, state.certificates.get(addr).copied())
        };

        let (mut client, server) =
            MemoryTransport::pair_with(self.blackhole.clone(), "client", addr);
        client.peer_certificate = certificate;
        listener
            .send(server)
            .await
            .map_err(|_| TransportError::connect_failed(addr, "listener gone"))?;
        Ok(client)
    }
}

// ============================================
// MemoryListener / MemoryConnector
// ============================================

/// Accepting side registered on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryListener {
    addr: String,
    incoming: AsyncMutex<mpsc::Receiver<MemoryTransport>>,
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&self) -> Result<Box<dyn Transport>> {
        let mut incoming = self.incoming.lock().await;
        let transport = incoming.recv().await.ok_or(TransportError::ConnectionClosed)?;
        Ok(Box::new(transport))
    }

    fn local_addr(&self) -> String {
        self.addr.clone()
    }
}

/// Dialing side of a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    network: MemoryNetwork,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn dial(&self, addr: &str) -> Result<Box<dyn Transport>> {
        Ok(Box::new(self.network.dial(addr).await?))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_roundtrip() {
        let (a, b) = MemoryTransport::pair();
        a.send(b"hello").await.unwrap();
        assert_eq!(&b.recv().await.unwrap()[..], b"hello");
        b.send(b"world").await.unwrap();
        assert_eq!(&a.recv().await.unwrap()[..], b"world");
    }

    #[tokio::test]
    async fn test_close_ends_peer_recv() {
        let (a, b) = MemoryTransport::pair();
        a.close().await.unwrap();
        assert!(matches!(b.recv().await, Err(TransportError::ConnectionClosed)));
        assert!(matches!(a.send(b"x").await, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_network_dial_and_accept() {
        let network = MemoryNetwork::new();
        let listener = network.listen("server:1");
        let client = network.connector().dial("server:1").await.unwrap();
        let server = listener.accept().await.unwrap();

        client.send(b"up").await.unwrap();
        assert_eq!(&server.recv().await.unwrap()[..], b"up");
        assert_eq!(network.dial_count(), 1);
        assert!(client.peer_certificate().is_none());
    }

    #[tokio::test]
    async fn test_listener_certificate_visible_to_dialer() {
        let network = MemoryNetwork::new();
        let _listener = network.listen("server:4");
        network.set_certificate("server:4", PeerCertificate::new([9; 32]));
        let client = network.connector().dial("server:4").await.unwrap();
        assert_eq!(client.peer_certificate(), Some(PeerCertificate::new([9; 32])));
    }

    #[tokio::test]
    async fn test_refuse_and_missing_listener() {
        let network = MemoryNetwork::new();
        let _listener = network.listen("server:2");
        network.set_refuse(true);
        assert!(network.connector().dial("server:2").await.is_err());
        network.set_refuse(false);
        assert!(network.connector().dial("nowhere").await.is_err());
    }

    #[tokio::test]
    async fn test_blackhole_drops_messages() {
        let network = MemoryNetwork::new();
        let listener = network.listen("server:3");
        let client = network.connector().dial("server:3").await.unwrap();
        let server = listener.accept().await.unwrap();

        network.set_blackhole(true);
        client.send(b"lost").await.unwrap();
        network.set_blackhole(false);
        client.send(b"kept").await.unwrap();
        assert_eq!(&server.recv().await.unwrap()[..], b"kept");
    }
}
