//! Protocol error types

use thiserror::Error;

/// Result alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from encoding or decoding wire messages.
///
/// Malformed hex inside a JSON field is reported by serde and surfaces as
/// [`ProtocolError::Json`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed
    #[error("json error: {0}")]
    Json(String),

    /// Frame exceeds the protocol limit
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Announced or actual size
        size: usize,
        /// Protocol maximum
        max: usize,
    },

    /// Buffer ends before the announced frame length
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    FrameTruncated {
        /// Bytes required by the prefix
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Byte field has the wrong length
    #[error("invalid field length for {field}: expected {expected}, got {actual}")]
    InvalidFieldLength {
        /// Field name
        field: &'static str,
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Copy a variable-length wire field into a fixed-size array.
///
/// # Errors
///
/// - `InvalidFieldLength` if `bytes` is not exactly `N` long
pub fn fixed_bytes<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| ProtocolError::InvalidFieldLength {
        field,
        expected: N,
        actual: bytes.len(),
    })
}
