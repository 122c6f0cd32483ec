// ============================================
// File: crates/burrow-client/src/error.rs
// ============================================
//! # Client Error Types
//!
//! ## Main Functionality
//! - `ClientError`: configuration, transport, credential, trust and
//!   protocol failures
//! - `lifecycle_event()`: maps a connection attempt failure onto the
//!   event fed to the reconnect state machine
//!
//! ## Error Classes
//! ```text
//! Transport ─────────────► TransportFailed        (retry with backoff)
//! Credential ────────────► AuthRejected           (Closed, fatal)
//! CertificateRejected ───► CertificateRejected    (Closed, fatal)
//! everything else ───────► AuthTransientFailure   (retry with backoff)
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial client errors

use thiserror::Error;

use burrow_core::error::CoreError;
use burrow_core::lifecycle::CloseReason;
use burrow_core::{Event, ReasonCode};
use burrow_transport::error::TransportError;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error types.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// File path
        path: String,
        /// Why
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Dotted field name
        field: String,
        /// Why
        reason: String,
    },

    /// Network failure while dialing, sending or receiving.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server rejected our credentials.
    #[error("Credentials rejected by server: {reason}")]
    Credential {
        /// Reason the server gave
        reason: ReasonCode,
    },

    /// Server identity could not be verified.
    #[error("Server certificate rejected: {reason}")]
    CertificateRejected {
        /// Why
        reason: String,
    },

    /// The server closed the connection during setup.
    #[error("Server disconnected: {reason}")]
    ServerDisconnect {
        /// Reason the server gave
        reason: ReasonCode,
    },

    /// A setup phase did not finish in time.
    #[error("{phase} timed out")]
    PhaseTimeout {
        /// Handshake or authentication
        phase: &'static str,
    },

    /// The state machine stopped.
    #[error("Connection closed: {reason}")]
    Closed {
        /// Why
        reason: CloseReason,
    },

    /// Wrapped protocol or crypto error.
    #[error(transparent)]
    Core(CoreError),
}

impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CertificateRejected { reason } => Self::CertificateRejected { reason },
            other => Self::Core(other),
        }
    }
}

impl ClientError {
    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    /// Returns `true` if reconnecting cannot fix this.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Credential { .. } | Self::CertificateRejected { .. } | Self::Closed { .. }
        ) || self.is_config_error()
    }

    /// Returns `true` if a later attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }

    /// Event to feed the state machine when a dial or authentication
    /// attempt fails with this error.
    #[must_use]
    pub const fn lifecycle_event(&self) -> Event {
        match self {
            Self::Transport(_) => Event::TransportFailed,
            Self::Credential { .. } => Event::AuthRejected,
            Self::CertificateRejected { .. } => Event::CertificateRejected,
            Self::ServerDisconnect {
                reason: ReasonCode::SessionExpired | ReasonCode::SessionNotFound,
            }
            | Self::Core(CoreError::SessionExpired) => Event::SessionExpired,
            _ => Event::AuthTransientFailure,
        }
    }
}
