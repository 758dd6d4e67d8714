//! Token sub-protocol carried inside frames.
//!
//! Server to client, every message is `\` + token letter + payload:
//!
//! | Token | Payload                           | Meaning                         |
//! |-------|-----------------------------------|---------------------------------|
//! | `i`   | `<position>:<max_position>`       | session init, always truthful   |
//! | `m`   | free text                         | notice (welcome, denial, error) |
//! | `p`   | `<position>`                      | position report, may be a lie   |
//! | `r`   | `<code>` or `1:<steps>`           | request acknowledged            |
//! | `s`   | none                              | move completed                  |
//!
//! Client to server, a request is `<code>` or `<code>:<steps>` with no marker.
//!
//! Numeric fields are parsed leniently: anything that is not an integer reads
//! as 0. Decoding a client request never fails.

use std::fmt;

use crate::{
    errors::{ProtocolError, Result},
    message::{Message, MessageKind},
};

/// Marker that opens every server message.
pub const MARKER: char = '\\';

const DELIMITER: char = ':';

/// Prefix of every error notice the device sends.
pub const ERROR_PREFIX: &str = "AVR Error: ";

/// Error detail for a move requested while another is in progress.
///
/// Clients match on it to learn that a speculative move never happened.
pub const ALREADY_MOVING_DETAIL: &str =
    "Unexpected behavior. Attempting to move while AVR already moving. Operation canceled.";

/// Server message discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    /// `i`: session init
    Init,
    /// `m`: free-text notice
    Notice,
    /// `p`: position report
    Position,
    /// `r`: request acknowledged
    Received,
    /// `s`: move completed
    Completed,
}

impl Token {
    /// Token letter as sent on the wire.
    pub fn as_char(self) -> char {
        match self {
            Self::Init => 'i',
            Self::Notice => 'm',
            Self::Position => 'p',
            Self::Received => 'r',
            Self::Completed => 's',
        }
    }

    /// Parse a token letter.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'i' => Some(Self::Init),
            'm' => Some(Self::Notice),
            'p' => Some(Self::Position),
            'r' => Some(Self::Received),
            's' => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Message sent by the device to its client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Initial device data, sent right after a connection is accepted
    Init {
        /// True current position
        position: i64,
        /// Maximum reachable position
        max_position: i64,
    },
    /// Free-text notice
    Notice(String),
    /// Reported position (possibly perturbed)
    Position(i64),
    /// The device received a request and is about to act on it
    Received {
        /// Kind of the acknowledged request
        kind: MessageKind,
        /// Echoed step count (only meaningful for `MoveForSteps`)
        steps: i64,
    },
    /// A move finished
    Completed,
}

impl ServerMessage {
    /// Token identifying this message.
    pub fn token(&self) -> Token {
        match self {
            Self::Init { .. } => Token::Init,
            Self::Notice(_) => Token::Notice,
            Self::Position(_) => Token::Position,
            Self::Received { .. } => Token::Received,
            Self::Completed => Token::Completed,
        }
    }

    /// Render as frame payload text.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse frame payload text.
    ///
    /// Fails if the text lacks the marker or names an unknown token. Payload
    /// fields themselves never fail; unparsable numbers read as 0.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        match chars.next() {
            None => return Err(ProtocolError::EmptyMessage),
            Some(MARKER) => {},
            Some(_) => return Err(ProtocolError::MissingMarker(text.to_string())),
        }

        let letter = chars.next().ok_or(ProtocolError::EmptyMessage)?;
        let token = Token::from_char(letter).ok_or(ProtocolError::UnknownToken(letter))?;
        let body = chars.as_str();

        Ok(match token {
            Token::Init => {
                let (position, max_position) = match body.split_once(DELIMITER) {
                    Some((position, max)) => (parse_lenient(position), parse_lenient(max)),
                    None => (parse_lenient(body), 0),
                };
                Self::Init { position, max_position }
            },
            Token::Notice => Self::Notice(body.to_string()),
            Token::Position => Self::Position(parse_lenient(body)),
            Token::Received => {
                let request = decode_request(body);
                Self::Received { kind: request.kind(), steps: request.steps() }
            },
            Token::Completed => Self::Completed,
        })
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MARKER}{}", self.token().as_char())?;
        match self {
            Self::Init { position, max_position } => write!(f, "{position}{DELIMITER}{max_position}"),
            Self::Notice(text) => f.write_str(text),
            Self::Position(position) => write!(f, "{position}"),
            Self::Received { kind, steps } => {
                f.write_str(&encode_request(&Message::new(*kind, *steps)))
            },
            Self::Completed => Ok(()),
        }
    }
}

/// Render a client request as frame payload text.
///
/// `MoveForSteps` carries its step count; every other kind is just the code.
pub fn encode_request(msg: &Message) -> String {
    match msg.kind() {
        MessageKind::MoveForSteps => {
            format!("{}{DELIMITER}{}", msg.kind().code(), msg.steps())
        },
        kind => kind.code().to_string(),
    }
}

/// Parse a client request.
///
/// Splits on the first `:`. Without a delimiter the whole text is the code
/// and steps default to 0. Non-numeric fragments read as 0 and unknown codes
/// become [`MessageKind::Unknown`].
pub fn decode_request(text: &str) -> Message {
    match text.split_once(DELIMITER) {
        Some((code, steps)) => Message::from_code(parse_lenient(code), parse_lenient(steps)),
        None => Message::from_code(parse_lenient(text), 0),
    }
}

fn parse_lenient(field: &str) -> i64 {
    field.trim().parse().unwrap_or(0)
}
