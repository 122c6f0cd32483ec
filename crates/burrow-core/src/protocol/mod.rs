// ============================================
// File: crates/burrow-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Wire definitions for the control channel and the tunnel records that
//! ride inside packet frames.
//!
//! ## Main Functionality
//! - [`messages`]: control message structs, type bytes, reason codes
//! - [`codec`]: `"BW"`-framed control message codec
//! - [`record`]: packet/control record kinds inside frame plaintext
//! - [`version`]: major/minor version negotiation
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Handshake (cleartext control messages)                     │
//! │  Client ─────────── ClientHello ───────────────────► Server │
//! │  Client ◄────────── ServerHello (signed) ─────────── Server │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Authentication (frames under channel keys)                 │
//! │  Client ═══════════ AuthRequest ═══════════════════► Server │
//! │  Client ◄══════════ AuthResponse / Disconnect ══════ Server │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Tunnel (frames under session keys)                         │
//! │  Client ◄═════ Packet / Ping / Pong / Rekey / Disconnect ══►│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - ANY wire change requires a version bump
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod messages;
pub mod record;
pub mod version;

pub use codec::{ControlCodec, WireFormat};
pub use messages::{
    AuthRequest, AuthResponse, ClientHello, ControlMessage, Disconnect, MessageType, ReasonCode,
    Rekey, ServerHello,
};
pub use record::TunnelRecord;
pub use version::{ProtocolVersion, CURRENT_PROTOCOL_VERSION};
