//! Turmoil-based Transport implementation using TCP streams.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use avr_server::Transport;
use turmoil::net::{TcpListener, TcpStream};

/// Simulation transport using Turmoil's deterministic TCP streams.
///
/// - **Deterministic delivery**: Turmoil controls ordering and timing
/// - **Fault injection**: latency, loss and partitions are set on the
///   `turmoil::Builder`
///
/// The server runs unchanged on top of it; only the listener differs from
/// production.
pub struct SimTransport {
    listener: TcpListener,
}

impl SimTransport {
    /// Binds to the specified address for accepting connections.
    ///
    /// # Errors
    ///
    /// Returns error if the address is already in use on this host.
    pub async fn bind(address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener })
    }

    /// Connects to a simulated host, e.g. `"server:28338"`.
    pub async fn connect_to(address: &str) -> io::Result<TcpStream> {
        TcpStream::connect(address).await
    }
}

#[async_trait]
impl Transport for SimTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        self.listener.accept().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[test]
    fn sim_transport_echo() {
        let mut sim = turmoil::Builder::new().build();

        sim.host("server", || async {
            let transport = SimTransport::bind("0.0.0.0:28338").await?;
            let (mut stream, _peer) = transport.accept().await?;

            let mut buf = [0u8; 128];
            let n = stream.read(&mut buf).await?;
            stream.write_all(&buf[..n]).await?;

            Ok(())
        });

        sim.client("client", async {
            let mut stream = SimTransport::connect_to("server:28338").await?;

            let message = b"\x00\x013";
            stream.write_all(message).await?;

            let mut buf = vec![0u8; message.len()];
            stream.read_exact(&mut buf).await?;
            assert_eq!(&buf, message);

            Ok(())
        });

        sim.run().expect("simulation failed");
    }
}
