//! Session manager tests over loopback TCP.
//!
//! A fast motion profile keeps moves in the low milliseconds so these run
//! against the real clock.

use std::{net::SocketAddr, time::Duration};

use avr_core::{DeviceConfig, DeviceEngine, MotionProfile};
use avr_proto::{FrameDecoder, Message, MessageKind, ServerMessage, encode_frame, encode_request};
use avr_server::{DENIAL_NOTICE, Server, SystemEnv, TcpTransport, Transport, WELCOME_NOTICE};
use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn fast_profile() -> MotionProfile {
    MotionProfile {
        initial_delay: Duration::from_millis(10),
        decay_factor: 0.5,
        min_delay: Duration::from_millis(1),
    }
}

async fn start(lie_probability: i64, max_position: i64) -> SocketAddr {
    let transport = TcpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = transport.local_addr().unwrap();
    let config = DeviceConfig::new(lie_probability, max_position).unwrap();
    let engine = DeviceEngine::with_profile(config, fast_profile(), SystemEnv::new());
    let server = Server::with_transport(transport, engine);
    tokio::spawn(server.run());
    addr
}

struct TestClient {
    stream: TcpStream,
    decoder: FrameDecoder,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        Self { stream: TcpStream::connect(addr).await.unwrap(), decoder: FrameDecoder::new() }
    }

    async fn send(&mut self, msg: Message) {
        let mut buf = BytesMut::new();
        encode_frame(&encode_request(&msg), &mut buf).unwrap();
        self.stream.write_all(&buf).await.unwrap();
    }

    async fn recv(&mut self) -> Option<ServerMessage> {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                if let Some(text) = self.decoder.next_frame().unwrap() {
                    return Some(ServerMessage::decode(&text).unwrap());
                }
                let mut chunk = [0u8; 256];
                let n = self.stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return None;
                }
                self.decoder.extend(&chunk[..n]);
            }
        })
        .await
        .expect("timed out waiting for server")
    }

    async fn expect(&mut self, expected: ServerMessage) {
        assert_eq!(self.recv().await, Some(expected));
    }

    async fn handshake(&mut self, position: i64, max_position: i64) {
        self.expect(ServerMessage::Notice(WELCOME_NOTICE.into())).await;
        self.expect(ServerMessage::Init { position, max_position }).await;
    }
}

#[tokio::test]
async fn welcome_precedes_init() {
    let addr = start(0, 15_000).await;
    let mut client = TestClient::connect(addr).await;
    client.handshake(0, 15_000).await;
}

#[tokio::test]
async fn move_is_acknowledged_then_completed() {
    let addr = start(0, 100).await;
    let mut client = TestClient::connect(addr).await;
    client.handshake(0, 100).await;

    client.send(Message::move_for_steps(3)).await;
    client.expect(ServerMessage::Received { kind: MessageKind::MoveForSteps, steps: 3 }).await;
    client.expect(ServerMessage::Completed).await;

    client.send(Message::get_position()).await;
    client.expect(ServerMessage::Received { kind: MessageKind::GetPosition, steps: 0 }).await;
    client.expect(ServerMessage::Position(3)).await;

    client.send(Message::move_to_zero()).await;
    client.expect(ServerMessage::Received { kind: MessageKind::MoveToZero, steps: 0 }).await;
    client.expect(ServerMessage::Completed).await;
}

#[tokio::test]
async fn out_of_range_ack_precedes_error() {
    let addr = start(0, 100).await;
    let mut client = TestClient::connect(addr).await;
    client.handshake(0, 100).await;

    client.send(Message::move_for_steps(-5)).await;
    client.expect(ServerMessage::Received { kind: MessageKind::MoveForSteps, steps: -5 }).await;
    client
        .expect(ServerMessage::Notice("AVR Error: Requested position is lower than 0.".into()))
        .await;

    client.send(Message::move_for_steps(101)).await;
    client.expect(ServerMessage::Received { kind: MessageKind::MoveForSteps, steps: 101 }).await;
    client
        .expect(ServerMessage::Notice(
            "AVR Error: Requested position is too large and exceeds the maximum value.".into(),
        ))
        .await;
}

#[tokio::test]
async fn unknown_request_gets_error_only() {
    let addr = start(0, 100).await;
    let mut client = TestClient::connect(addr).await;
    client.handshake(0, 100).await;

    client.send(Message::from_code(42, 0)).await;
    client.expect(ServerMessage::Notice("AVR Error: Unknown type of incoming message.".into())).await;

    // session still usable
    client.send(Message::get_position()).await;
    client.expect(ServerMessage::Received { kind: MessageKind::GetPosition, steps: 0 }).await;
    client.expect(ServerMessage::Position(0)).await;
}

#[tokio::test]
async fn query_at_zero_is_truthful_even_when_always_lying() {
    let addr = start(100, 100).await;
    let mut client = TestClient::connect(addr).await;
    client.handshake(0, 100).await;

    for _ in 0..5 {
        client.send(Message::get_position()).await;
        client.expect(ServerMessage::Received { kind: MessageKind::GetPosition, steps: 0 }).await;
        client.expect(ServerMessage::Position(0)).await;
    }
}

#[tokio::test]
async fn second_client_denied_first_unaffected() {
    let addr = start(0, 100).await;
    let mut first = TestClient::connect(addr).await;
    first.handshake(0, 100).await;

    let mut second = TestClient::connect(addr).await;
    second.expect(ServerMessage::Notice(DENIAL_NOTICE.into())).await;
    assert_eq!(second.recv().await, None, "denied connection should be closed");

    first.send(Message::move_for_steps(2)).await;
    first.expect(ServerMessage::Received { kind: MessageKind::MoveForSteps, steps: 2 }).await;
    first.expect(ServerMessage::Completed).await;
}

#[tokio::test]
async fn slot_is_released_on_disconnect() {
    let addr = start(0, 100).await;
    let mut first = TestClient::connect(addr).await;
    first.handshake(0, 100).await;
    first.send(Message::move_for_steps(4)).await;
    first.expect(ServerMessage::Received { kind: MessageKind::MoveForSteps, steps: 4 }).await;
    first.expect(ServerMessage::Completed).await;
    drop(first);

    // the server learns about the disconnect asynchronously
    let mut attempts = 0;
    let mut next = loop {
        let mut client = TestClient::connect(addr).await;
        match client.recv().await {
            Some(ServerMessage::Notice(text)) if text == WELCOME_NOTICE => break client,
            Some(ServerMessage::Notice(text)) if text == DENIAL_NOTICE && attempts < 50 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
            },
            other => panic!("unexpected {other:?}"),
        }
    };

    // init carries the true position left behind by the previous client
    next.expect(ServerMessage::Init { position: 4, max_position: 100 }).await;
}
