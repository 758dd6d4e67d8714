//! Client error types.

use avr_proto::ProtocolError;
use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request could not be framed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The operation needs a live connection.
    #[error("not connected")]
    NotConnected,
}

impl ClientError {
    /// Returns true if the connection is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(_) | Self::NotConnected => true,
            Self::Protocol(_) => false,
        }
    }
}
