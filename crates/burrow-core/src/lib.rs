// ============================================
// File: crates/burrow-core/src/lib.rs
// ============================================
//! # Burrow Core - Protocol, Cryptography & Lifecycle
//!
//! ## Creation Reason
//! Everything the tunnel engine decides without touching a socket: how
//! frames look, how they are sealed, which sequences are fresh, how keys
//! rotate, and what the connection should do next.
//!
//! ## Main Functionality
//!
//! ### Data plane
//! - [`codec`]: `len | nonce | ciphertext | tag` packet frames
//! - [`cipher`]: per-session key rings, send counter, receive guards
//! - [`replay`]: 64-wide sliding replay window
//!
//! ### Control plane
//! - [`crypto`]: identity/ephemeral keys, handshake, HKDF, credential proof
//! - [`protocol`]: control messages, their codec, tunnel records, versions
//! - [`control`]: control messages sealed under the channel keys
//!
//! ### Lifecycle
//! - [`lifecycle`]: pure reconnect/keepalive state machine and backoff
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        burrow-server            burrow-client       │
//! │              │                        │             │
//! │              └──────────┬─────────────┘             │
//! │                         ▼                           │
//! │   burrow-core  ◄── burrow-transport                 │
//! │   You are here                                      │
//! │         │                                           │
//! │         ▼                                           │
//! │   burrow-common                                     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//! - **Confidentiality & integrity**: ChaCha20-Poly1305 per frame
//! - **Server authenticity**: Ed25519-signed handshake transcript, pinned
//! - **Forward secrecy**: X25519 ephemeral exchange per connection
//! - **No reflection**: direction-separated keys
//! - **Replay protection**: per-epoch sliding window
//!
//! ## ⚠️ Important Note for Next Developer
//! - No I/O in this crate; time comes in through `burrow_common::Clock`
//! - ALL key types implement Zeroize and redact their Debug output
//! - Wire changes require a protocol version bump
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cipher;
pub mod codec;
pub mod control;
pub mod crypto;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod replay;

// Re-export commonly used items
pub use cipher::{CipherConfig, SessionCipher};
pub use codec::FrameCodec;
pub use control::{Role, SealedChannel};
pub use crypto::{
    ClientHandshake, CredentialProof, CredentialVerifier, DirectionKeys, HandshakeOutcome,
    IdentityKeyPair, IdentityPublicKey, ServerHandshake, SessionKey, TrustedServers,
};
pub use error::{CoreError, Result};
pub use lifecycle::{
    transition, Action, AuthFailureMonitor, AuthFailurePolicy, ConnectionState, Event,
    LifecycleConfig, MachineState,
};
pub use protocol::{
    ControlMessage, ProtocolVersion, ReasonCode, TunnelRecord, CURRENT_PROTOCOL_VERSION,
};
pub use replay::ReplayGuard;
