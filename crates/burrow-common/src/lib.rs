// ============================================
// File: crates/burrow-common/src/lib.rs
// ============================================
//! # Burrow Common - Shared Foundations
//!
//! ## Creation Reason
//! Holds the small set of types every Burrow crate agrees on, so the core
//! protocol, the transports and both endpoints never disagree about what a
//! session token or a virtual address looks like.
//!
//! ## Main Functionality
//! - [`types`]: `SessionToken`, `VirtualIp`
//! - [`time`]: `AtomicInstant`, the `Clock` abstraction and a manual clock
//!   for deterministic tests, coarse wall-clock timestamps
//! - [`error`]: `CommonError` and its result alias
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        burrow-server          burrow-client         │
//! │              │                      │               │
//! │         ┌────┴──────────┬───────────┘               │
//! │         ▼               ▼                           │
//! │   burrow-core     burrow-transport                  │
//! │         │               │                           │
//! │         └───────┬───────┘                           │
//! │                 ▼                                   │
//! │          burrow-common  ◄── You are here            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Leaf crate: no internal dependencies
//! - Anything time-dependent in the engine goes through [`time::Clock`];
//!   do not call `Instant::now()` directly in code that tests need to drive
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

pub use error::{CommonError, Result};
pub use time::{AtomicInstant, Clock, ManualClock, SystemClock};
pub use types::{SessionToken, VirtualIp};
