// ============================================
// File: crates/burrow-transport/src/adapter/mod.rs
// ============================================
//! # Virtual Adapter Implementations
//!
//! - `linux`: attaches to an existing TUN interface via `/dev/net/tun`
//! - `mock`: in-memory adapter for tests (`mock` feature)
//!
//! ```text
//!   applications ──IP──► [ TUN burrow0 ] ──read_packet──► engine
//!   applications ◄──IP── [ TUN burrow0 ] ◄─write_packet── engine
//! ```
//!
//! The interface's address, routes and DNS are configured outside the
//! engine.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_os = "linux")]
pub use linux::TunAdapter;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockAdapter;
