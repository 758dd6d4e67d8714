//! Listening transport.
//!
//! The server only ever needs to accept byte streams, so the abstraction is a
//! single `accept()` returning something that reads and writes.
//!
//! # Implementations
//!
//! - **`TcpTransport`** (production): tokio `TcpListener`
//! - **`SimTransport`** (testing, in `avr-harness`): Turmoil's simulated TCP

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};

use crate::error::ServerError;

/// Source of incoming client streams.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Bidirectional byte stream to one client.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next incoming connection.
    ///
    /// # Errors
    ///
    /// Accept errors are usually transient (e.g. too many open files); the
    /// server logs them and keeps listening.
    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;

    /// Address the transport is listening on.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Production transport over TCP.
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind to `addr`.
    ///
    /// # Errors
    ///
    /// `ServerError::ListenFailed` if the address is in use or not local.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::listen_failed(addr.to_string(), e))?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, "set_nodelay failed: {e}");
        }
        Ok((stream, peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
