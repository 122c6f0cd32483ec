// ============================================
// File: crates/burrow-server/src/lib.rs
// ============================================
//! # Burrow Server Library
//!
//! ## Creation Reason
//! Server side of the Burrow tunnel: accepts client connections,
//! authenticates them, hands out virtual addresses and moves packets
//! between each client and the shared virtual adapter.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: TOML configuration
//! - [`server`]: orchestration and task lifecycle
//! - [`services`]: session store, control channel, address pool,
//!   routing table, credentials
//! - [`handlers`]: per-session workers
//! - [`key_file`]: identity key persistence
//! - [`error`]: server error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Burrow Server                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐    │
//! │  │   Config    │────►│   Server    │────►│ Session workers │    │
//! │  └─────────────┘     └──────┬──────┘     └────────┬────────┘    │
//! │                             │                     │             │
//! │         ┌───────────────────┼─────────────────────┤             │
//! │         ▼                   ▼                     ▼             │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐        │
//! │  │  Session    │     │   Routing   │     │   IP Pool   │        │
//! │  │  Store      │     │   Table     │     │             │        │
//! │  └─────────────┘     └─────────────┘     └─────────────┘        │
//! │                                                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                       Transport Layer                           │
//! │  ┌─────────────────────┐     ┌─────────────────────────────┐    │
//! │  │   TCP transport     │     │      Virtual adapter        │    │
//! │  │  (client frames)    │     │       (IP packets)          │    │
//! │  └─────────────────────┘     └─────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//! Client → TCP → Decode → Worker → Adapter → Internet
//! Client ← TCP ← Encode ← Worker ← Route ← Adapter ← Internet
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The adapter must be created and addressed by external tooling
//! - Configuration changes require restart
//!
//! ## Last Modified
//! v0.1.0 - Initial server library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod key_file;
pub mod server;
pub mod services;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::Server;
pub use services::{CredentialStore, FileCredentialStore};
