//! Length-prefixed framing.
//!
//! Layout on the wire:
//! `[payload length: u16 big-endian] + [payload: UTF-8 text]`
//!
//! The length counts payload bytes only, never the prefix itself. Both the
//! emulator and the test client use this module unchanged.

use bytes::{Buf, BufMut, BytesMut};
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U16},
};

use crate::errors::{ProtocolError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Largest payload the prefix can describe.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Raw length prefix as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct LengthPrefix {
    len: U16<BigEndian>,
}

impl LengthPrefix {
    /// Prefix for a payload of `len` bytes.
    pub fn new(len: u16) -> Self {
        Self { len: U16::new(len) }
    }

    /// Declared payload length in bytes.
    pub fn payload_len(&self) -> usize {
        usize::from(self.len.get())
    }
}

/// Append one frame carrying `text` to `dst`.
///
/// Fails without touching `dst` if the UTF-8 encoding of `text` is longer
/// than [`MAX_PAYLOAD_SIZE`].
pub fn encode_frame(text: &str, dst: &mut BytesMut) -> Result<()> {
    let payload = text.as_bytes();
    let len = u16::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
        size: payload.len(),
        max: MAX_PAYLOAD_SIZE,
    })?;

    dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
    dst.put_slice(LengthPrefix::new(len).as_bytes());
    dst.put_slice(payload);
    Ok(())
}

/// Incremental frame decoder.
///
/// Bytes arrive in arbitrary chunks via [`extend`](Self::extend). Each call to
/// [`next_frame`](Self::next_frame) yields at most one complete payload and
/// returns `Ok(None)` when more data is needed. Once the prefix has been read
/// the declared length is remembered, so a frame split across many reads is
/// resumed where it stopped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    pending_len: Option<usize>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer newly received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Declared length of the frame currently being reassembled, if its
    /// prefix has already been consumed.
    pub fn pending_len(&self) -> Option<usize> {
        self.pending_len
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Try to take the next complete frame.
    ///
    /// A payload that is not valid UTF-8 is consumed and reported as
    /// [`ProtocolError::InvalidEncoding`]; the decoder stays usable.
    pub fn next_frame(&mut self) -> Result<Option<String>> {
        let len = match self.pending_len {
            Some(len) => len,
            None => {
                let Ok((prefix, _)) = LengthPrefix::read_from_prefix(&self.buf[..]) else {
                    return Ok(None);
                };
                self.buf.advance(LENGTH_PREFIX_SIZE);
                let len = prefix.payload_len();
                self.pending_len = Some(len);
                len
            },
        };

        if self.buf.len() < len {
            return Ok(None);
        }

        self.pending_len = None;
        let payload = self.buf.split_to(len);
        String::from_utf8(payload.to_vec())
            .map(Some)
            .map_err(|_| ProtocolError::InvalidEncoding { len })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn encode_writes_big_endian_prefix() {
        let mut buf = BytesMut::new();
        encode_frame("1:56", &mut buf).unwrap();
        assert_eq!(&buf[..], &hex!("0004 313a3536"));
    }

    #[test]
    fn prefix_counts_utf8_bytes() {
        let mut buf = BytesMut::new();
        encode_frame("é", &mut buf).unwrap();
        assert_eq!(&buf[..], &hex!("0002 c3a9"));
    }

    #[test]
    fn empty_payload_is_legal() {
        let mut buf = BytesMut::new();
        encode_frame("", &mut buf).unwrap();
        assert_eq!(&buf[..], &hex!("0000"));

        let mut decoder = FrameDecoder::new();
        decoder.extend(&buf);
        assert_eq!(decoder.next_frame().unwrap(), Some(String::new()));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn oversized_payload_rejected() {
        let text = "a".repeat(MAX_PAYLOAD_SIZE + 1);
        let mut buf = BytesMut::new();
        let err = encode_frame(&text, &mut buf).unwrap_err();
        assert_eq!(err, ProtocolError::FrameTooLarge { size: MAX_PAYLOAD_SIZE + 1, max: MAX_PAYLOAD_SIZE });
        assert!(buf.is_empty());
    }

    #[test]
    fn max_payload_fits() {
        let text = "a".repeat(MAX_PAYLOAD_SIZE);
        let mut buf = BytesMut::new();
        encode_frame(&text, &mut buf).unwrap();
        assert_eq!(buf.len(), LENGTH_PREFIX_SIZE + MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn single_byte_prefix_needs_more_data() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x00]);
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.pending_len(), None);
        assert_eq!(decoder.buffered(), 1);
    }

    #[test]
    fn partial_payload_keeps_declared_length() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&hex!("0005 5c6d"));
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.pending_len(), Some(5));

        decoder.extend(b"ab");
        assert_eq!(decoder.next_frame().unwrap(), None);

        decoder.extend(b"c");
        assert_eq!(decoder.next_frame().unwrap().as_deref(), Some("\\mabc"));
        assert_eq!(decoder.pending_len(), None);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn yields_back_to_back_frames_one_at_a_time() {
        let mut buf = BytesMut::new();
        encode_frame("\\r2", &mut buf).unwrap();
        encode_frame("\\s", &mut buf).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.extend(&buf);
        assert_eq!(decoder.next_frame().unwrap().as_deref(), Some("\\r2"));
        assert_eq!(decoder.next_frame().unwrap().as_deref(), Some("\\s"));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn invalid_utf8_is_consumed_and_stream_stays_in_sync() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&hex!("0002 fffe"));
        let mut buf = BytesMut::new();
        encode_frame("3", &mut buf).unwrap();
        decoder.extend(&buf);

        assert_eq!(decoder.next_frame(), Err(ProtocolError::InvalidEncoding { len: 2 }));
        assert_eq!(decoder.next_frame().unwrap().as_deref(), Some("3"));
    }
}
