// ============================================
// File: crates/burrow-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! The engine talks to the network and to the virtual adapter only
//! through these traits, so the whole client/server stack runs against
//! in-memory implementations in tests.
//!
//! ## Main Functionality
//! - `Transport`: reliable, message-oriented connection
//! - `Connector` / `Listener`: produce transports
//! - `VirtualAdapter`: raw IP packets in and out
//! - `PeerCertificate`: identity the transport itself authenticated
//!
//! ## ⚠️ Important Note for Next Developer
//! - `send` and `recv` take `&self` and must be callable concurrently
//!   from different tasks (one reader, one writer)
//! - Message boundaries are preserved; one `send` is one `recv`
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

// ============================================
// PeerCertificate
// ============================================

/// Identity the transport layer authenticated for the remote end.
///
/// Carries the Ed25519 public key the peer proved possession of. The
/// control channel requires it to equal the handshake identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerCertificate {
    public_key: [u8; 32],
}

impl PeerCertificate {
    /// Wraps a public key.
    #[must_use]
    pub const fn new(public_key: [u8; 32]) -> Self {
        Self { public_key }
    }

    /// The certified public key.
    #[must_use]
    pub const fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }
}

impl fmt::Debug for PeerCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerCertificate({})", hex::encode(&self.public_key[..8]))
    }
}

// ============================================
// Transport
// ============================================

/// A connected, reliable, message-oriented transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one message.
    ///
    /// # Errors
    /// `ConnectionClosed`, `MessageTooLarge` or an I/O error.
    async fn send(&self, message: &[u8]) -> Result<()>;

    /// Receives one message.
    ///
    /// # Errors
    /// `ConnectionClosed` once the peer is gone, or an I/O error.
    async fn recv(&self) -> Result<Bytes>;

    /// Certificate presented by the peer, if the transport authenticates
    /// peers.
    fn peer_certificate(&self) -> Option<PeerCertificate>;

    /// Printable remote address for logs.
    fn peer_addr(&self) -> String;

    /// Closes the transport; pending and later operations fail.
    ///
    /// # Errors
    /// Returns an I/O error if the shutdown itself fails.
    async fn close(&self) -> Result<()>;
}

/// Opens outbound transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dials `addr`.
    ///
    /// # Errors
    /// `ConnectFailed` or `Timeout`.
    async fn dial(&self, addr: &str) -> Result<Box<dyn Transport>>;
}

/// Accepts inbound transports.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Waits for the next connection.
    ///
    /// # Errors
    /// Returns an error if the listener is broken.
    async fn accept(&self) -> Result<Box<dyn Transport>>;

    /// Printable local address.
    fn local_addr(&self) -> String;
}

// ============================================
// VirtualAdapter
// ============================================

/// A virtual network adapter carrying raw IP packets.
///
/// The adapter is created, addressed and routed by external tooling; the
/// engine only reads and writes packets.
#[async_trait]
pub trait VirtualAdapter: Send + Sync {
    /// Reads the next outbound IP packet.
    ///
    /// # Errors
    /// `AdapterReadFailed` or `AdapterClosed`.
    async fn read_packet(&self) -> Result<Bytes>;

    /// Writes an inbound IP packet.
    ///
    /// # Errors
    /// `AdapterWriteFailed` or `AdapterClosed`.
    async fn write_packet(&self, packet: &[u8]) -> Result<()>;

    /// Interface name.
    fn name(&self) -> &str;

    /// Interface MTU.
    fn mtu(&self) -> u16;
}
