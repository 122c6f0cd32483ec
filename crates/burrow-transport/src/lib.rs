// ============================================
// File: crates/burrow-transport/src/lib.rs
// ============================================
//! # Burrow Transport - Network & Adapter I/O
//!
//! ## Creation Reason
//! Everything that moves bytes: the stream transport between client and
//! server, and the virtual adapter carrying IP packets on each end.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `Transport`, `Connector`, `Listener`, `VirtualAdapter`
//! - [`tcp`]: length-prefixed TCP transport
//! - [`adapter`]: Linux TUN attach and mock adapter
//! - [`memory`]: in-memory transport and network (`mock` feature)
//! - [`error`]: transport error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        burrow-server            burrow-client       │
//! │              │                        │             │
//! │              └──────────┬─────────────┘             │
//! │                         ▼                           │
//! │   burrow-core      burrow-transport                 │
//! │                    You are here ◄──                 │
//! │         │                │                          │
//! │         └───────┬────────┘                          │
//! │                 ▼                                   │
//! │          burrow-common                              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//!  client apps ─► TUN ─► client engine ══TCP (frames)══► server engine ─► TUN ─► internet
//! ```
//!
//! ## Platform Support
//! | Platform | TCP | TUN |
//! |----------|-----|-----|
//! | Linux    | ✅  | ✅  |
//! | macOS    | ✅  | ❌  |
//! | Windows  | ✅  | ❌  |
//!
//! ## ⚠️ Important Note for Next Developer
//! - Attaching to TUN requires elevated privileges
//! - Engine code depends on the traits only
//! - Platform-specific code stays behind `cfg(target_os)`
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod memory;
pub mod tcp;
pub mod traits;

// Re-export primary types
pub use error::{Result, TransportError};
pub use tcp::{TcpConnector, TcpTransport, TcpTransportListener};
pub use traits::{Connector, Listener, PeerCertificate, Transport, VirtualAdapter};

#[cfg(target_os = "linux")]
pub use adapter::TunAdapter;

#[cfg(any(test, feature = "mock"))]
pub use adapter::MockAdapter;
#[cfg(any(test, feature = "mock"))]
pub use memory::{MemoryConnector, MemoryListener, MemoryNetwork, MemoryTransport};
