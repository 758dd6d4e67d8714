//! Connection wrapper.
//!
//! Frames requests, reassembles responses and runs every response through
//! the [`Verifier`]. Generic over the stream so tests can drive it over an
//! in-memory duplex or a simulated socket.

use avr_proto::{FrameDecoder, Message, ServerMessage, encode_frame, encode_request};
use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, ToSocketAddrs},
};

use crate::{
    error::ClientError,
    verifier::{Observation, Verifier},
};

const READ_CHUNK: usize = 4096;

/// Test client for one emulator connection.
#[derive(Debug)]
pub struct Client<S> {
    stream: Option<S>,
    decoder: FrameDecoder,
    verifier: Verifier,
    buf: BytesMut,
}

impl Client<TcpStream> {
    /// Connect to an emulator over TCP.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    /// Wrap an already connected stream.
    pub fn from_stream(stream: S) -> Self {
        let mut verifier = Verifier::new();
        verifier.mark_connected();
        Self { stream: Some(stream), decoder: FrameDecoder::new(), verifier, buf: BytesMut::new() }
    }

    /// Whether the connection is still live.
    pub fn is_connected(&self) -> bool {
        self.verifier.is_connected()
    }

    /// Prediction state.
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Send a request and update the prediction.
    pub async fn send(&mut self, msg: Message) -> Result<(), ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;

        self.buf.clear();
        encode_frame(&encode_request(&msg), &mut self.buf)?;
        stream.write_all(&self.buf).await?;
        stream.flush().await?;

        tracing::debug!(kind = ?msg.kind(), steps = msg.steps(), "request sent");
        self.verifier.record_request(&msg);
        Ok(())
    }

    /// Wait for the next server message and classify it.
    ///
    /// Returns `Ok(None)` once the server closes the connection.
    pub async fn next_observation(&mut self) -> Result<Option<Observation>, ClientError> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match self.decoder.next_frame() {
                Ok(Some(text)) => {
                    let observation = match ServerMessage::decode(&text) {
                        Ok(msg) => self.verifier.observe(msg),
                        Err(e) => {
                            tracing::warn!("unknown server message {text:?}: {e}");
                            Observation::Unrecognized(text)
                        },
                    };
                    return Ok(Some(observation));
                },
                Ok(None) => {},
                Err(e) => {
                    tracing::warn!("malformed frame skipped: {e}");
                    continue;
                },
            }

            let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                tracing::info!("server closed the connection");
                self.stream = None;
                self.verifier.reset();
                return Ok(None);
            }
            self.decoder.extend(&chunk[..n]);
        }
    }

    /// Close the connection and forget the prediction.
    pub async fn disconnect(&mut self) -> Result<(), ClientError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        tracing::info!("disconnecting");
        self.verifier.reset();
        self.decoder = FrameDecoder::new();
        stream.shutdown().await?;
        Ok(())
    }
}
