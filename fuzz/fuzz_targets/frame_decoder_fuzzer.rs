//! Fuzz target for [`FrameDecoder`] and the token decoders
//!
//! # Strategy
//!
//! - Well-formed frames: fuzzed texts encoded with `encode_frame`, then fed
//!   in arbitrary chunk sizes
//! - Garbage: raw bytes appended after the frames (bad prefixes, invalid
//!   UTF-8, truncated payloads)
//!
//! # Invariants
//!
//! - Every well-formed frame comes back out, in order, regardless of chunking
//! - No frame is ever produced from a partial payload
//! - `decode_request` and `ServerMessage::decode` NEVER panic on any text

#![no_main]

use arbitrary::Arbitrary;
use avr_proto::{decode_request, encode_frame, FrameDecoder, ServerMessage, LENGTH_PREFIX_SIZE};
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    texts: Vec<String>,
    trailing: Vec<u8>,
    chunk_sizes: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let mut wire = BytesMut::new();
    let mut expected = Vec::new();
    for text in &input.texts {
        if encode_frame(text, &mut wire).is_ok() {
            expected.push(text.clone());
        }
    }
    let framed_len = wire.len();
    wire.extend_from_slice(&input.trailing);

    let mut decoder = FrameDecoder::new();
    let mut decoded = Vec::new();
    let mut offset = 0;
    let mut chunks = input.chunk_sizes.iter().cycle();

    while offset < wire.len() {
        let step = chunks.next().map_or(wire.len(), |&n| usize::from(n).max(1));
        let end = (offset + step).min(wire.len());
        decoder.extend(&wire[offset..end]);
        offset = end;

        while let Some(result) = next(&mut decoder) {
            if let Ok(text) = result {
                let _ = decode_request(&text);
                let _ = ServerMessage::decode(&text);
                decoded.push(text);
            }
        }

        if offset <= framed_len {
            assert!(decoded.len() <= expected.len());
            assert_eq!(&decoded[..], &expected[..decoded.len()], "frames out of order");
        }
    }

    assert!(decoded.len() >= expected.len(), "well-formed frame lost");
    assert_eq!(&decoded[..expected.len()], &expected[..]);

    if let Some(len) = decoder.pending_len() {
        assert!(decoder.buffered() < len, "complete frame left undecoded");
    } else {
        assert!(decoder.buffered() < LENGTH_PREFIX_SIZE, "complete prefix left unread");
    }
});

/// Next decoder outcome, `None` once more bytes are needed.
fn next(decoder: &mut FrameDecoder) -> Option<Result<String, ()>> {
    match decoder.next_frame() {
        Ok(Some(text)) => Some(Ok(text)),
        Ok(None) => None,
        Err(_) => Some(Err(())),
    }
}
