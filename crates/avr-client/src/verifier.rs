//! Position prediction oracle.
//!
//! The verifier never trusts a `p` report. It keeps its own model of where
//! the device must be, updated from the requests the client sends and from
//! the always-truthful `i` init, and classifies every report against it.
//!
//! Predictions are made when a request is sent, not when it is acknowledged:
//! a move the device will reject for range reasons is predicted as a no-op.
//! A move the device refuses because it is already moving cannot be foreseen,
//! so each sent move stays unconfirmed until its acknowledgement. If the
//! notice right after that acknowledgement is the already-moving error, the
//! move's contribution to the prediction is taken back.

use std::collections::VecDeque;

use avr_proto::{ALREADY_MOVING_DETAIL, ERROR_PREFIX, Message, MessageKind, ServerMessage};

/// What a server message meant to the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Init data received; prediction reset to the true position
    Initialized {
        /// True position
        position: i64,
        /// Maximum position
        max_position: i64,
    },
    /// The device acknowledged a request
    Acknowledged {
        /// Request kind
        kind: MessageKind,
        /// Echoed step count
        steps: i64,
    },
    /// A move finished
    Completed,
    /// Free-text notice
    Notice(String),
    /// Reported position matches the prediction
    Truthful {
        /// Reported (and expected) position
        position: i64,
    },
    /// Reported position differs from the prediction
    Lie {
        /// What the device claimed
        reported: i64,
        /// Where it must really be
        expected: i64,
    },
    /// A frame that does not decode as a server message
    Unrecognized(String),
}

/// Client-side model of the device's true position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verifier {
    true_expected_position: i64,
    max_position: i64,
    connected: bool,
    /// Prediction change of each sent move, oldest first
    unconfirmed: VecDeque<i64>,
    /// Change of the move acknowledged by the previous message
    awaiting_verdict: Option<i64>,
}

impl Verifier {
    /// Fresh, disconnected verifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicted true position.
    pub fn expected_position(&self) -> i64 {
        self.true_expected_position
    }

    /// Maximum position learned from init (0 before init).
    pub fn max_position(&self) -> i64 {
        self.max_position
    }

    /// Whether a connection is live.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Mark the connection live.
    pub fn mark_connected(&mut self) {
        self.connected = true;
    }

    /// Forget all predictions and mark disconnected.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Update the prediction for a request about to be sent.
    pub fn record_request(&mut self, msg: &Message) {
        let before = self.true_expected_position;
        match msg.kind() {
            MessageKind::MoveForSteps => {
                let projected = before.checked_add(msg.steps());
                if let Some(target) = projected.filter(|p| (0..=self.max_position).contains(p)) {
                    self.true_expected_position = target;
                }
            },
            MessageKind::MoveToZero => self.true_expected_position = 0,
            MessageKind::GetPosition | MessageKind::Unknown => return,
        }
        self.unconfirmed.push_back(self.true_expected_position - before);
    }

    /// Classify a server message against the prediction.
    pub fn observe(&mut self, msg: ServerMessage) -> Observation {
        let verdict = self.awaiting_verdict.take();

        match msg {
            ServerMessage::Init { position, max_position } => {
                self.true_expected_position = position;
                self.max_position = max_position;
                self.unconfirmed.clear();
                tracing::info!(position, max_position, "device ready");
                Observation::Initialized { position, max_position }
            },
            ServerMessage::Position(reported) => {
                let expected = self.true_expected_position;
                if reported == expected {
                    tracing::info!(position = reported, "position is true");
                    Observation::Truthful { position: reported }
                } else {
                    tracing::warn!(reported, expected, "device is lying");
                    Observation::Lie { reported, expected }
                }
            },
            ServerMessage::Received { kind, steps } => {
                if matches!(kind, MessageKind::MoveForSteps | MessageKind::MoveToZero) {
                    self.awaiting_verdict = self.unconfirmed.pop_front();
                }
                tracing::debug!(?kind, steps, "request acknowledged");
                Observation::Acknowledged { kind, steps }
            },
            ServerMessage::Completed => {
                tracing::debug!("move complete");
                Observation::Completed
            },
            ServerMessage::Notice(text) => {
                let refused = text.strip_prefix(ERROR_PREFIX) == Some(ALREADY_MOVING_DETAIL);
                if let Some(change) = verdict.filter(|_| refused) {
                    self.true_expected_position -= change;
                    tracing::warn!(
                        expected = self.true_expected_position,
                        "move refused while moving; prediction taken back"
                    );
                }
                tracing::info!("notice: {text}");
                Observation::Notice(text)
            },
        }
    }
}
