// ============================================
// File: crates/burrow-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Errors of the byte-moving layer: stream transports and the virtual
//! adapter.
//!
//! ## Error Categories
//! 1. **Connection Errors**: dial, accept, send, receive, closed
//! 2. **Adapter Errors**: attach, read, write
//! 3. **Configuration Errors**: bad addresses or limits
//! 4. **System Errors**: permissions, timeouts, raw I/O
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every connection error is handed to the reconnect state machine as
//!   a transport failure; keep `is_connection_error` complete
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;

use thiserror::Error;

use burrow_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Connection Errors
    // ========================================

    /// Dial failed (refused, unreachable, ...).
    #[error("Failed to connect to {addr}: {reason}")]
    ConnectFailed {
        /// Address we dialed
        addr: String,
        /// Why it failed
        reason: String,
    },

    /// Listener could not be opened.
    #[error("Cannot listen on {addr}: {reason}")]
    BindFailed {
        /// Listen address
        addr: String,
        /// OS error text
        reason: String,
    },

    /// Peer closed the connection, or we did.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Message larger than the length prefix can carry.
    #[error("Message of {size} bytes exceeds limit of {limit}")]
    MessageTooLarge {
        /// Message size
        size: usize,
        /// Limit
        limit: usize,
    },

    // ========================================
    // Adapter Errors
    // ========================================

    /// Failed to attach to the virtual adapter.
    #[error("Failed to attach adapter '{name}': {reason}")]
    AdapterAttachFailed {
        /// Adapter name
        name: String,
        /// Why attaching failed
        reason: String,
    },

    /// Adapter read failed.
    #[error("Adapter read failed: {reason}")]
    AdapterReadFailed {
        /// Why read failed
        reason: String,
    },

    /// Adapter write failed.
    #[error("Adapter write failed: {reason}")]
    AdapterWriteFailed {
        /// Why write failed
        reason: String,
    },

    /// Adapter was closed.
    #[error("Adapter closed")]
    AdapterClosed,

    /// Adapter or listener parameter rejected before any I/O.
    #[error("Invalid {field}: {reason}")]
    InvalidConfig {
        /// Parameter name
        field: String,
        /// Constraint violated
        reason: String,
    },

    /// The OS refused access (usually a missing CAP_NET_ADMIN).
    #[error("Not permitted to {operation}")]
    PermissionDenied {
        /// Refused operation
        operation: String,
    },

    /// Dial or read deadline passed.
    #[error("{operation} timed out")]
    Timeout {
        /// Operation name
        operation: String,
    },

    /// Other socket or device I/O failure.
    #[error("{context}: {source}")]
    Io {
        /// Operation in progress
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Shared value type failure.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `BindFailed` error.
    pub fn bind_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `AdapterAttachFailed` error.
    pub fn attach_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AdapterAttachFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Maps a stream I/O error, folding EOF and resets into
    /// `ConnectionClosed`.
    #[must_use]
    pub fn from_stream(context: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::ConnectionClosed,
            _ => Self::io(context, err),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if retrying the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectFailed { .. } | Self::ConnectionClosed => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns `true` if the connection is unusable.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. }
                | Self::ConnectionClosed
                | Self::MessageTooLarge { .. }
                | Self::Timeout { .. }
                | Self::Io { .. }
        )
    }

    /// Returns `true` if this is a virtual adapter error.
    #[must_use]
    pub const fn is_adapter_error(&self) -> bool {
        matches!(
            self,
            Self::AdapterAttachFailed { .. }
                | Self::AdapterReadFailed { .. }
                | Self::AdapterWriteFailed { .. }
                | Self::AdapterClosed
        )
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "transport I/O".into(),
            source: err,
        }
    }
}

// ============================================
// Tests
// ============================================
