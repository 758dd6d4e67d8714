//! Error types for the AVR wire protocol.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while framing or parsing protocol messages.
///
/// None of these are fatal to a connection. A complete frame is always
/// consumed before its payload is validated, so the byte stream stays in sync
/// and callers can log the error and keep reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload does not fit the 16-bit length prefix
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Actual payload size in bytes
        size: usize,
        /// Maximum encodable payload size
        max: usize,
    },

    /// Frame payload is not valid UTF-8
    #[error("frame payload is not valid UTF-8 ({len} bytes)")]
    InvalidEncoding {
        /// Length of the rejected payload
        len: usize,
    },

    /// Server message is empty or stops after the marker
    #[error("empty server message")]
    EmptyMessage,

    /// Server message does not begin with the `\` marker
    #[error("missing token marker in message {0:?}")]
    MissingMarker(String),

    /// Token letter is not one the protocol defines
    #[error("unknown token '\\{0}'")]
    UnknownToken(char),
}
