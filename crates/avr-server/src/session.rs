//! Session manager.
//!
//! The device serves exactly one client at a time. The server task owns the
//! listening transport, the write half of the live session and the event
//! stream of the device worker, and multiplexes them in one `select!` loop:
//!
//! ```text
//!   Transport::accept ──> welcome + ClientInit   (or denial for a 2nd client)
//!   reader task ────────> SessionInput::Request ──> DeviceHandle
//!   device worker ──────> DeviceEvent ──> ServerMessage ──> session writer
//! ```
//!
//! A single writer keeps outbound messages in the order the device produced
//! them. Each session has its own reader task doing frame reassembly, so a
//! slow or partial frame never stalls the device.
//!
//! Device events are addressed to the session that caused them. An event for
//! a session that is no longer current is dropped, so a client that connects
//! while an earlier client's move is still running never sees its completion.

use std::net::SocketAddr;

use avr_core::{DeviceEngine, DeviceEvent, Environment};
use avr_proto::{FrameDecoder, Message, ServerMessage, decode_request, encode_frame};
use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf},
    sync::mpsc,
    task::JoinHandle,
};

use crate::{
    error::ServerError,
    transport::Transport,
    worker::{DeviceHandle, SessionEvent, SessionId, spawn_device},
};

/// Notice sent to a client right after its connection is accepted.
pub const WELCOME_NOTICE: &str = "AVR Response: Connected successfuly!";

/// Notice sent to a connection refused because a client is already active.
pub const DENIAL_NOTICE: &str = "AVR System already has a client. Connection denied.";

const READ_CHUNK: usize = 4096;

// Reader tasks of a finished session may still report in; their id no
// longer matches and the input is discarded.
#[derive(Debug)]
enum SessionInput {
    Request { session_id: SessionId, msg: Message },
    Closed { session_id: SessionId },
}

/// Writes server messages as length-prefixed frames.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a write half.
    pub fn new(inner: W) -> Self {
        Self { inner, buf: BytesMut::new() }
    }

    /// Encode, frame and flush one message.
    pub async fn send(&mut self, msg: &ServerMessage) -> Result<(), ServerError> {
        self.buf.clear();
        encode_frame(&msg.encode(), &mut self.buf)?;
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write direction.
    pub async fn shutdown(&mut self) -> Result<(), ServerError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

struct Session<W> {
    id: SessionId,
    peer: SocketAddr,
    writer: FrameWriter<W>,
    reader: JoinHandle<()>,
}

/// Map a device event to the message its client should see.
///
/// Position updates are local telemetry and never leave the server.
pub fn outbound_message(event: &DeviceEvent) -> Option<ServerMessage> {
    match event {
        DeviceEvent::MessageReceived { kind, steps } => {
            Some(ServerMessage::Received { kind: *kind, steps: *steps })
        },
        DeviceEvent::PositionUpdate { .. } => None,
        DeviceEvent::WorkComplete => Some(ServerMessage::Completed),
        DeviceEvent::PositionReport { position } => Some(ServerMessage::Position(*position)),
        DeviceEvent::ClientInit { position, max_position } => {
            Some(ServerMessage::Init { position: *position, max_position: *max_position })
        },
        DeviceEvent::Error(err) => Some(ServerMessage::Notice(err.notice())),
    }
}

/// Single-client emulator server, generic over the listening transport.
pub struct Server<T: Transport> {
    transport: T,
    device: DeviceHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    worker: JoinHandle<()>,
    session: Option<Session<WriteHalf<T::Stream>>>,
    inputs_tx: mpsc::UnboundedSender<SessionInput>,
    inputs_rx: mpsc::UnboundedReceiver<SessionInput>,
    next_session_id: SessionId,
}

impl<T: Transport> Server<T> {
    /// Build a server around an already bound transport.
    ///
    /// Spawns the device worker, so this must be called inside a tokio
    /// runtime (or a Turmoil host).
    pub fn with_transport<E: Environment>(transport: T, engine: DeviceEngine<E>) -> Self {
        let (device, events, worker) = spawn_device(engine);
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();

        Self {
            transport,
            device,
            events,
            worker,
            session: None,
            inputs_tx,
            inputs_rx,
            next_session_id: 1,
        }
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.transport.local_addr()?)
    }

    /// Handle to the device worker, e.g. for watching state.
    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// Whether a client currently holds the session.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Accept clients and relay device traffic until a fatal error.
    ///
    /// # Errors
    ///
    /// Only `ServerError::DeviceStopped` ends the loop; transport errors on
    /// individual connections are logged and the server keeps listening.
    pub async fn run(mut self) -> Result<(), ServerError> {
        match self.transport.local_addr() {
            Ok(addr) => tracing::info!(%addr, "server listening"),
            Err(e) => tracing::warn!("listening on unknown address: {e}"),
        }

        let result = loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = self.on_accept(stream, peer).await {
                            break Err(e);
                        }
                    },
                    Err(e) => tracing::error!("accept error: {e}"),
                },

                Some(input) = self.inputs_rx.recv() => {
                    if let Err(e) = self.on_input(input) {
                        break Err(e);
                    }
                },

                event = self.events.recv() => match event {
                    Some(event) => self.on_event(event).await,
                    None => break Err(ServerError::DeviceStopped),
                },
            }
        };

        self.close_session();
        self.worker.abort();
        result
    }

    async fn on_accept(&mut self, stream: T::Stream, peer: SocketAddr) -> Result<(), ServerError> {
        if let Some(session) = &self.session {
            tracing::info!(%peer, active = %session.peer, "connection denied");
            tokio::spawn(deny(stream, peer));
            return Ok(());
        }

        let id = self.next_session_id;
        self.next_session_id = self.next_session_id.wrapping_add(1);

        let (read, write) = tokio::io::split(stream);
        let mut writer = FrameWriter::new(write);
        if let Err(e) = writer.send(&ServerMessage::Notice(WELCOME_NOTICE.to_string())).await {
            tracing::error!(%peer, "failed to greet client: {e}");
            return Ok(());
        }

        let reader = tokio::spawn(read_requests(id, read, self.inputs_tx.clone()));
        self.session = Some(Session { id, peer, writer, reader });
        tracing::info!(%peer, session_id = id, "client connected");

        self.device.request_client_init(id)
    }

    fn on_input(&mut self, input: SessionInput) -> Result<(), ServerError> {
        match input {
            SessionInput::Request { session_id, msg } => {
                if !self.is_current(session_id) {
                    tracing::debug!(session_id, "request from stale session dropped");
                    return Ok(());
                }
                self.device.send_message(session_id, msg)
            },
            SessionInput::Closed { session_id } => {
                if self.is_current(session_id) {
                    if let Some(session) = self.session.take() {
                        tracing::info!(peer = %session.peer, session_id, "client disconnected");
                    }
                }
                Ok(())
            },
        }
    }

    async fn on_event(&mut self, SessionEvent { session_id, event }: SessionEvent) {
        let Some(message) = outbound_message(&event) else {
            return;
        };

        let Some(session) = self.session.as_mut().filter(|s| s.id == session_id) else {
            tracing::debug!(session_id, ?event, "session gone; event dropped");
            return;
        };

        tracing::debug!(session_id = session.id, "send {message}");
        if let Err(e) = session.writer.send(&message).await {
            tracing::error!(peer = %session.peer, "write failed: {e}");
            self.close_session();
        }
    }

    fn is_current(&self, session_id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == session_id)
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.reader.abort();
            tracing::info!(peer = %session.peer, session_id = session.id, "session closed");
        }
    }
}

/// Tell a surplus connection the device is taken, then hang up.
async fn deny<S: AsyncWrite + Unpin>(stream: S, peer: SocketAddr) {
    let mut writer = FrameWriter::new(stream);
    if let Err(e) = writer.send(&ServerMessage::Notice(DENIAL_NOTICE.to_string())).await {
        tracing::debug!(%peer, "failed to send denial: {e}");
        return;
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(%peer, "shutdown after denial failed: {e}");
    }
}

/// Reassemble frames from one client and forward decoded requests.
async fn read_requests<R: AsyncRead + Unpin>(
    session_id: SessionId,
    mut reader: R,
    inputs: mpsc::UnboundedSender<SessionInput>,
) {
    let mut decoder = FrameDecoder::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    'read: loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(session_id, "read error: {e}");
                break;
            },
        };
        decoder.extend(&chunk[..n]);

        loop {
            match decoder.next_frame() {
                Ok(Some(text)) => {
                    let msg = decode_request(&text);
                    tracing::debug!(session_id, kind = ?msg.kind(), steps = msg.steps(), "recv {text:?}");
                    if inputs.send(SessionInput::Request { session_id, msg }).is_err() {
                        break 'read;
                    }
                },
                Ok(None) => break,
                Err(e) => tracing::warn!(session_id, "malformed frame skipped: {e}"),
            }
        }
    }

    let _ = inputs.send(SessionInput::Closed { session_id });
}
