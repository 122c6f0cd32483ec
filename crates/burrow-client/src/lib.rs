// ============================================
// File: crates/burrow-client/src/lib.rs
// ============================================
//! # Burrow Client Library
//!
//! ## Creation Reason
//! Client side of the Burrow tunnel: keeps an authenticated session to
//! one pinned server alive across network changes and moves packets
//! between the local adapter and the tunnel.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`client`]: connection driver and public API
//! - [`control`]: handshake and authentication exchange
//! - [`pump`]: per-packet encode/decode
//! - [`buffer`]: outbound packets parked while the tunnel is down
//! - [`config`]: TOML configuration
//! - [`stats`]: traffic counters
//! - [`error`]: client error types and their lifecycle classification
//!
//! ## Architecture Overview
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Burrow Client                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │   ┌───────────┐   events    ┌──────────────────────────┐     │
//! │   │ lifecycle │◄────────────│   Client (driver loop)   │     │
//! │   │ transition│────────────►│                          │     │
//! │   └───────────┘   actions   └───┬─────────┬────────┬───┘     │
//! │                                 │         │        │         │
//! │                        ┌────────▼──┐ ┌────▼───┐ ┌──▼──────┐  │
//! │                        │ Control   │ │  Pump  │ │ Outbound│  │
//! │                        │ Client    │ │        │ │ Buffer  │  │
//! │                        └────────┬──┘ └──┬─────┘ └─────────┘  │
//! ├─────────────────────────────────┼───────┼────────────────────┤
//! │                      Transport  ▼       ▼  Virtual adapter    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The client never talks to a server whose key is not pinned
//! - Only credential and certificate rejections stop `run()`; everything
//!   else is retried with backoff
//!
//! ## Last Modified
//! v0.1.0 - Initial client library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod client;
pub mod config;
pub mod control;
pub mod error;
pub mod pump;
pub mod stats;

pub use buffer::OutboundBuffer;
pub use client::{Client, SessionInfo};
pub use config::ClientConfig;
pub use control::{ControlClient, Credentials, SessionDescriptor};
pub use error::{ClientError, Result};
pub use stats::Statistics;
