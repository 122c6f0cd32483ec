// ============================================
// File: crates/burrow-server/src/services/mod.rs
// ============================================
//! # Server Services
//!
//! ## Main Functionality
//! - `SessionStore`: admission, key material and session lifetime
//! - `ControlService`: handshake and authentication on new connections
//! - `IpPool`: virtual address allocation
//! - `RoutingTable`: virtual address to session worker
//! - `CredentialStore`: proof verification
//!
//! ## Dependency Graph
//! ```text
//!   ControlService ──► SessionStore ──┬──► CredentialStore
//!                                     ├──► IpPool
//!                                     └──► RoutingTable ◄── adapter reader
//! ```

pub mod control;
pub mod credentials;
pub mod ip_pool;
pub mod routing;
pub mod session_store;

pub use control::ControlService;
pub use credentials::{CredentialStore, FileCredentialStore};
pub use ip_pool::IpPool;
pub use routing::{Dispatch, RoutingTable};
pub use session_store::{NewSession, Session, SessionPolicy, SessionStore, StatsSnapshot};
