// ============================================
// File: crates/burrow-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Main Functionality
//! - `ServerError`: configuration, admission, session and wrapped lower
//!   layer errors
//! - `reason_code()`: maps admission failures onto the `Disconnect`
//!   reason sent to the client
//!
//! ## Last Modified
//! v0.1.0 - Initial server errors

use thiserror::Error;

use burrow_common::error::CommonError;
use burrow_common::SessionToken;
use burrow_core::error::CoreError;
use burrow_core::ReasonCode;
use burrow_transport::error::TransportError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
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

    /// Identity key file problem.
    #[error("Key file '{path}': {reason}")]
    KeyFile {
        /// File path
        path: String,
        /// Why
        reason: String,
    },

    /// Credential file problem.
    #[error("Credential file '{path}' line {line}: {reason}")]
    CredentialFile {
        /// File path
        path: String,
        /// 1-based line number
        line: usize,
        /// Why
        reason: String,
    },

    /// Proof did not verify, or the identity is unknown.
    #[error("Credentials rejected for identity '{identity}'")]
    CredentialsRejected {
        /// Claimed identity
        identity: String,
    },

    /// No session with this token (or it expired).
    #[error("Session not found: {0}")]
    SessionNotFound(SessionToken),

    /// Global session limit reached.
    #[error("Session limit reached: max {limit} sessions")]
    SessionLimitReached {
        /// Configured limit
        limit: usize,
    },

    /// Per-identity session limit reached.
    #[error("Identity '{identity}' already has {limit} sessions")]
    IdentityLimitReached {
        /// Identity
        identity: String,
        /// Configured limit
        limit: usize,
    },

    /// No free virtual address.
    #[error("Virtual address pool exhausted")]
    PoolExhausted,

    /// Peer sent something out of sequence.
    #[error("Protocol violation from {peer}: {reason}")]
    ProtocolViolation {
        /// Peer label
        peer: String,
        /// Why
        reason: String,
    },

    /// Peer did not finish a phase in time.
    #[error("{phase} timed out for {peer}")]
    PhaseTimeout {
        /// Handshake or auth
        phase: &'static str,
        /// Peer label
        peer: String,
    },

    /// Server could not start.
    #[error("Server failed to start: {reason}")]
    StartupFailed {
        /// Why
        reason: String,
    },

    /// Wrapped common error.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Wrapped protocol or crypto error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Wrapped transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ServerError {
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

    /// Creates a `KeyFile` error.
    pub fn key_file(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::KeyFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ProtocolViolation` error.
    pub fn protocol_violation(peer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            peer: peer.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `StartupFailed` error.
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. }
                | Self::ConfigInvalid { .. }
                | Self::KeyFile { .. }
                | Self::CredentialFile { .. }
        )
    }

    /// Returns `true` for admission failures reported to the client.
    #[must_use]
    pub const fn is_admission_error(&self) -> bool {
        matches!(
            self,
            Self::CredentialsRejected { .. }
                | Self::SessionLimitReached { .. }
                | Self::IdentityLimitReached { .. }
                | Self::PoolExhausted
        )
    }

    /// Returns `true` if the server cannot run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.is_config_error() || matches!(self, Self::StartupFailed { .. })
    }

    /// Reason code sent in `Disconnect` when this error ends a connection.
    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        match self {
            Self::CredentialsRejected { .. } => ReasonCode::InvalidCredentials,
            Self::SessionLimitReached { .. } => ReasonCode::Overloaded,
            Self::IdentityLimitReached { .. } => ReasonCode::TooManySessions,
            Self::PoolExhausted => ReasonCode::AddressAllocationFailed,
            Self::SessionNotFound(_) => ReasonCode::SessionNotFound,
            Self::ProtocolViolation { .. } => ReasonCode::InvalidMessage,
            Self::PhaseTimeout { .. } => ReasonCode::Timeout,
            Self::Core(CoreError::UnsupportedVersion { .. }) => ReasonCode::VersionMismatch,
            Self::Core(CoreError::SessionExpired) => ReasonCode::SessionExpired,
            Self::Transport(_) => ReasonCode::NetworkError,
            _ => ReasonCode::Unknown,
        }
    }
}
