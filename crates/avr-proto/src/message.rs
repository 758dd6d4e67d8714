//! Client requests.
//!
//! Every request a client sends to the device is translated into a
//! [`Message`] before the device sees it.

/// What a client is asking the device to do.
///
/// Discriminants are the wire codes used in both client requests and the
/// server's `r` acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Unrecognized request; the device rejects it
    Unknown = 0,
    /// Move by a signed number of steps from the current position
    MoveForSteps = 1,
    /// Move back to position 0
    MoveToZero = 2,
    /// Report the current position
    GetPosition = 3,
}

impl MessageKind {
    /// Map a raw wire code to a kind.
    ///
    /// Any code outside the declared range collapses to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::MoveForSteps,
            2 => Self::MoveToZero,
            3 => Self::GetPosition,
            _ => Self::Unknown,
        }
    }

    /// Wire code for this kind.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Immutable client request: a kind plus an optional step count.
///
/// `steps` is only meaningful for [`MessageKind::MoveForSteps`] and defaults
/// to 0 otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Message {
    kind: MessageKind,
    steps: i64,
}

impl Message {
    /// Create a message with an explicit step count.
    pub fn new(kind: MessageKind, steps: i64) -> Self {
        Self { kind, steps }
    }

    /// Create a message from a raw wire code.
    pub fn from_code(code: i64, steps: i64) -> Self {
        Self::new(MessageKind::from_code(code), steps)
    }

    /// `MoveForSteps` request.
    pub fn move_for_steps(steps: i64) -> Self {
        Self::new(MessageKind::MoveForSteps, steps)
    }

    /// `MoveToZero` request.
    pub fn move_to_zero() -> Self {
        Self::new(MessageKind::MoveToZero, 0)
    }

    /// `GetPosition` request.
    pub fn get_position() -> Self {
        Self::new(MessageKind::GetPosition, 0)
    }

    /// Request kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Requested step count (0 unless `MoveForSteps`).
    pub fn steps(&self) -> i64 {
        self.steps
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new(MessageKind::Unknown, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_codes_collapse_to_unknown() {
        for code in [-1, 0, 4, 99, i64::MAX, i64::MIN] {
            assert_eq!(MessageKind::from_code(code), MessageKind::Unknown, "code {code}");
        }
    }

    #[test]
    fn codes_match_kinds() {
        for kind in [
            MessageKind::Unknown,
            MessageKind::MoveForSteps,
            MessageKind::MoveToZero,
            MessageKind::GetPosition,
        ] {
            assert_eq!(MessageKind::from_code(i64::from(kind.code())), kind);
        }
    }

    #[test]
    fn default_message_is_unknown() {
        let msg = Message::default();
        assert_eq!(msg.kind(), MessageKind::Unknown);
        assert_eq!(msg.steps(), 0);
    }
}
