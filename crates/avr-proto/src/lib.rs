//! Wire protocol for the AVR device emulator.
//!
//! Two layers, shared by the emulator and its test client:
//!
//! - Frame codec: a 2-byte big-endian length prefix followed by a UTF-8 text
//!   payload. [`FrameDecoder`] reassembles frames across partial reads.
//! - Token protocol: the text inside a frame. Server messages start with the
//!   `\` marker and a token letter ([`ServerMessage`]). Client requests are a
//!   bare `<code>` or `<code>:<steps>` ([`Message`]).
//!
//! Everything here is pure: no sockets, no clocks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod message;
pub mod token;

pub use errors::{ProtocolError, Result};
pub use frame::{FrameDecoder, LENGTH_PREFIX_SIZE, LengthPrefix, MAX_PAYLOAD_SIZE, encode_frame};
pub use message::{Message, MessageKind};
pub use token::{
    ALREADY_MOVING_DETAIL, ERROR_PREFIX, MARKER, ServerMessage, Token, decode_request,
    encode_request,
};
