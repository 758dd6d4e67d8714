//! Device and configuration errors.

use avr_proto::{ALREADY_MOVING_DETAIL, ERROR_PREFIX};
use thiserror::Error;

/// Errors reported by the device engine.
///
/// All of these are recovered locally: the engine stays in (or returns to) a
/// valid state and the error is relayed to the client as a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The client sent a request code the device does not understand
    #[error("unknown message type")]
    UnknownMessage,

    /// Move target is below position 0
    #[error("requested position {requested} is below zero")]
    PositionBelowZero {
        /// Rejected target position
        requested: i64,
    },

    /// Move target is beyond the configured maximum
    #[error("requested position {requested} exceeds maximum {max}")]
    PositionExceedsMax {
        /// Rejected target position
        requested: i64,
        /// Configured maximum position
        max: i64,
    },

    /// A move was requested while another is still in progress
    #[error("already moving towards {goal}")]
    AlreadyMoving {
        /// Goal of the in-flight move
        goal: i64,
    },
}

impl DeviceError {
    /// Human-readable notice relayed to the client.
    pub fn notice(&self) -> String {
        let detail = match self {
            Self::UnknownMessage => "Unknown type of incoming message.",
            Self::PositionBelowZero { .. } => "Requested position is lower than 0.",
            Self::PositionExceedsMax { .. } => {
                "Requested position is too large and exceeds the maximum value."
            },
            Self::AlreadyMoving { .. } => ALREADY_MOVING_DETAIL,
        };
        format!("{ERROR_PREFIX}{detail}")
    }
}

/// Rejected device configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Lie probability outside 0..=100
    #[error("lie probability must be between 0 and 100, got {0}")]
    LieProbabilityOutOfRange(i64),

    /// Maximum position below 1
    #[error("maximum position must be at least 1, got {0}")]
    MaxPositionTooSmall(i64),

    /// Motion profile with a zero floor or a decay factor outside (0, 1]
    #[error("invalid motion profile: {0}")]
    InvalidMotionProfile(&'static str),
}
