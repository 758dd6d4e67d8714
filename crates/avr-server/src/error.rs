//! Server error types.

use std::net::SocketAddr;

use avr_core::ConfigError;
use avr_proto::ProtocolError;
use thiserror::Error;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listening socket; the server cannot start
    #[error("unable to listen on {addr}: {source}")]
    ListenFailed {
        /// Address we tried to bind
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Rejected configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Listen address could not be parsed
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    /// Transport/network error
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Protocol error while encoding an outgoing message
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The device worker exited
    #[error("device worker stopped")]
    DeviceStopped,
}

impl ServerError {
    /// Build a `ListenFailed` error for `addr`.
    pub fn listen_failed(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::ListenFailed { addr: addr.into(), source }
    }

    /// Returns true if the server cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ListenFailed { .. }
                | Self::Config(_)
                | Self::InvalidAddress(_)
                | Self::DeviceStopped
        )
    }
}

/// Parse `host:port` into a socket address.
pub(crate) fn parse_addr(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.parse::<std::net::IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|_| ServerError::InvalidAddress(format!("{host}:{port}")))
}
