// ============================================
// File: crates/burrow-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Failures of the shared value types (tokens, addresses). Wrapped by
//! `CoreError`, `TransportError` and `ServerError` through `#[from]`.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never put key material, proofs or credentials into an error message;
//!   report lengths and formats only
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

/// Common result type.
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared value types.
#[derive(Error, Debug)]
pub enum CommonError {
    /// A fixed-size value had the wrong number of bytes.
    #[error("Expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required size
        expected: usize,
        /// Size received
        actual: usize,
    },

    /// Text could not be decoded into bytes.
    #[error("Malformed {format} text: {details}")]
    Encoding {
        /// Text encoding, e.g. "base64"
        format: &'static str,
        /// Decoder message
        details: String,
    },

    /// A value was well-formed but not acceptable.
    #[error("Invalid {field}: {reason}")]
    InvalidInput {
        /// Field or parameter name
        field: String,
        /// What is wrong with it
        reason: String,
    },
}

impl CommonError {
    /// Creates an `InvalidLength` error.
    #[must_use]
    pub const fn invalid_length(expected: usize, actual: usize) -> Self {
        Self::InvalidLength { expected, actual }
    }

    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the bytes or text themselves were unusable, as opposed to
    /// a rejected value.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::InvalidLength { .. } | Self::Encoding { .. })
    }
}

impl From<base64::DecodeError> for CommonError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Encoding {
            format: "base64",
            details: err.to_string(),
        }
    }
}
