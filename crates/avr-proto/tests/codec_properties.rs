//! Property tests for the frame codec and token protocol.

use avr_proto::{
    FrameDecoder, LENGTH_PREFIX_SIZE, Message, MessageKind, ServerMessage, decode_request,
    encode_frame, encode_request,
};
use bytes::BytesMut;
use proptest::prelude::*;

fn any_kind() -> impl Strategy<Value = MessageKind> {
    prop_oneof![
        Just(MessageKind::Unknown),
        Just(MessageKind::MoveForSteps),
        Just(MessageKind::MoveToZero),
        Just(MessageKind::GetPosition),
    ]
}

fn any_server_message() -> impl Strategy<Value = ServerMessage> {
    prop_oneof![
        (0i64..100_000, 1i64..100_000)
            .prop_map(|(position, max_position)| ServerMessage::Init { position, max_position }),
        ".*".prop_map(ServerMessage::Notice),
        any::<i64>().prop_map(ServerMessage::Position),
        any::<i64>().prop_map(|steps| ServerMessage::Received { kind: MessageKind::MoveForSteps, steps }),
        Just(ServerMessage::Received { kind: MessageKind::MoveToZero, steps: 0 }),
        Just(ServerMessage::Received { kind: MessageKind::GetPosition, steps: 0 }),
        Just(ServerMessage::Completed),
    ]
}

proptest! {
    #[test]
    fn prop_frame_round_trip_across_split_reads(
        payloads in prop::collection::vec(".{0,64}", 1..8),
        chunk in 1usize..16,
    ) {
        let mut wire = BytesMut::new();
        for payload in &payloads {
            encode_frame(payload, &mut wire).unwrap();
        }

        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            decoder.extend(piece);
            while let Some(frame) = decoder.next_frame().unwrap() {
                decoded.push(frame);
            }
        }

        prop_assert_eq!(decoded, payloads);
        prop_assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn prop_frame_length_matches_utf8_len(payload in ".{0,128}") {
        let mut wire = BytesMut::new();
        encode_frame(&payload, &mut wire).unwrap();
        prop_assert_eq!(wire.len(), LENGTH_PREFIX_SIZE + payload.len());
        prop_assert_eq!(usize::from(u16::from_be_bytes([wire[0], wire[1]])), payload.len());
    }

    #[test]
    fn prop_no_frame_from_truncated_input(payload in ".{1,64}") {
        let mut wire = BytesMut::new();
        encode_frame(&payload, &mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.extend(&wire[..wire.len() - 1]);
        prop_assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn prop_request_round_trip(kind in any_kind(), steps in any::<i64>()) {
        let steps = if kind == MessageKind::MoveForSteps { steps } else { 0 };
        let msg = Message::new(kind, steps);
        prop_assert_eq!(decode_request(&encode_request(&msg)), msg);
    }

    #[test]
    fn prop_decode_request_never_panics(text in ".*") {
        let msg = decode_request(&text);
        prop_assert!(matches!(
            msg.kind(),
            MessageKind::Unknown
                | MessageKind::MoveForSteps
                | MessageKind::MoveToZero
                | MessageKind::GetPosition
        ));
    }

    #[test]
    fn prop_server_message_round_trip(msg in any_server_message()) {
        prop_assert_eq!(ServerMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn prop_server_decode_never_panics(text in ".*") {
        let _ = ServerMessage::decode(&text);
    }
}
