//! Device engine.
//!
//! # Architecture: Action-Based State Machine
//!
//! The engine owns the device state and never performs I/O or sleeps. Every
//! operation returns the events it produced; the driver (the server's device
//! worker, or a test) routes them and decides when to call
//! [`DeviceEngine::advance`] next, based on [`DeviceEngine::next_step_delay`].
//!
//! # State Machine
//!
//! ```text
//!            move_to(pos == current) -> WorkComplete
//!          ┌──────┐
//!          │      ▼
//!        ┌──────────┐  move_to(pos != current)  ┌──────────┐
//!        │   Idle   │──────────────────────────>│  Moving  │──┐ advance():
//!        └──────────┘                           └──────────┘  │ one unit step,
//!              ▲        advance() at goal             │  ▲    │ PositionUpdate
//!              └──────── WorkComplete ────────────────┘  └────┘
//! ```
//!
//! Starting a move reports the start position with the first delay; each
//! `advance()` after that steps one unit.
//!
//! A move requested while `Moving` is refused with
//! [`DeviceError::AlreadyMoving`]; the in-flight move is never interrupted,
//! replaced or queued behind.

use std::time::Duration;

use avr_proto::{Message, MessageKind};

use crate::{
    config::{DeviceConfig, LIE_SPREAD, MotionProfile},
    env::Environment,
    error::DeviceError,
};

/// Whether the device is currently moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePhase {
    /// Waiting for a request
    Idle,
    /// Stepping towards `goal_position`
    Moving,
}

/// Snapshot of the device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    /// Idle or moving
    pub phase: DevicePhase,
    /// True position, always within `0..=max_position`
    pub current_position: i64,
    /// Target of the last accepted move; authoritative only while moving
    pub goal_position: i64,
}

/// Outcomes produced by the engine, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A request was received and is about to be acted on
    MessageReceived {
        /// Request kind
        kind: MessageKind,
        /// Echoed step count (0 unless `MoveForSteps`)
        steps: i64,
    },
    /// Position display update; telemetry only
    PositionUpdate {
        /// Position reached (the start position when a move begins)
        position: i64,
        /// Time until the next step is due
        delay: Duration,
    },
    /// A move finished (or was a no-op)
    WorkComplete,
    /// Answer to a position query, possibly perturbed
    PositionReport {
        /// Reported position
        position: i64,
    },
    /// Truthful data for initializing a new client
    ClientInit {
        /// True current position
        position: i64,
        /// Configured maximum position
        max_position: i64,
    },
    /// A request was rejected
    Error(DeviceError),
}

/// Simulated positioning device.
///
/// # Invariants
///
/// - `current_position` stays within `0..=max_position`
/// - `current_position` only changes inside `advance()`, by one unit
/// - `phase` only becomes `Moving` from `Idle`
/// - position queries never mutate state
#[derive(Debug)]
pub struct DeviceEngine<E: Environment> {
    config: DeviceConfig,
    profile: MotionProfile,
    state: DeviceState,
    /// Delay used for the most recent step
    delay: Duration,
    /// Time until the next `advance()` is due; `None` when idle
    next_step: Option<Duration>,
    env: E,
}

impl<E: Environment> DeviceEngine<E> {
    /// Create an idle device at position 0 with the default motion profile.
    pub fn new(config: DeviceConfig, env: E) -> Self {
        Self::with_profile(config, MotionProfile::default(), env)
    }

    /// Create an idle device at position 0 with a custom motion profile.
    pub fn with_profile(config: DeviceConfig, profile: MotionProfile, env: E) -> Self {
        Self {
            config,
            profile,
            state: DeviceState {
                phase: DevicePhase::Idle,
                current_position: 0,
                goal_position: 0,
            },
            delay: profile.initial_delay,
            next_step: None,
            env,
        }
    }

    /// Device configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Environment supplying time and randomness.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Current state snapshot.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Idle or moving.
    pub fn phase(&self) -> DevicePhase {
        self.state.phase
    }

    /// True current position.
    pub fn current_position(&self) -> i64 {
        self.state.current_position
    }

    /// Goal of the current (or last) move.
    pub fn goal_position(&self) -> i64 {
        self.state.goal_position
    }

    /// Time until `advance()` should be called again, or `None` when idle.
    pub fn next_step_delay(&self) -> Option<Duration> {
        self.next_step
    }

    /// Dispatch a client request.
    ///
    /// Valid requests are acknowledged with `MessageReceived` before they are
    /// acted on, so the acknowledgement precedes any validation error of the
    /// move itself. Unknown requests yield only an `Error` event.
    pub fn handle_message(&mut self, msg: Message) -> Vec<DeviceEvent> {
        let mut events = Vec::new();

        match msg.kind() {
            MessageKind::MoveForSteps => {
                events.push(DeviceEvent::MessageReceived { kind: msg.kind(), steps: msg.steps() });
                let target = self.state.current_position.saturating_add(msg.steps());
                self.move_to_into(target, &mut events);
            },
            MessageKind::MoveToZero => {
                events.push(DeviceEvent::MessageReceived { kind: msg.kind(), steps: 0 });
                self.move_to_into(0, &mut events);
            },
            MessageKind::GetPosition => {
                events.push(DeviceEvent::MessageReceived { kind: msg.kind(), steps: 0 });
                events.push(DeviceEvent::PositionReport { position: self.query_position() });
            },
            MessageKind::Unknown => {
                tracing::debug!(steps = msg.steps(), "unknown message");
                events.push(DeviceEvent::Error(DeviceError::UnknownMessage));
            },
        }

        events
    }

    /// Begin moving to `pos`.
    ///
    /// Returns `[WorkComplete]` if already there. Otherwise starts moving and
    /// returns the `PositionUpdate` for the start position; the first unit
    /// step is due after its delay, and later updates and completion come
    /// from `advance()`.
    ///
    /// # Errors
    ///
    /// - `AlreadyMoving` if a move is in progress (checked first)
    /// - `PositionBelowZero` / `PositionExceedsMax` if `pos` is out of range
    ///
    /// State is unchanged on error.
    pub fn move_to(&mut self, pos: i64) -> Result<Vec<DeviceEvent>, DeviceError> {
        if self.state.phase == DevicePhase::Moving {
            return Err(DeviceError::AlreadyMoving { goal: self.state.goal_position });
        }
        if pos < 0 {
            return Err(DeviceError::PositionBelowZero { requested: pos });
        }
        if pos > self.config.max_position() {
            return Err(DeviceError::PositionExceedsMax {
                requested: pos,
                max: self.config.max_position(),
            });
        }

        if pos == self.state.current_position {
            self.state.goal_position = pos;
            return Ok(vec![DeviceEvent::WorkComplete]);
        }

        tracing::debug!(from = self.state.current_position, to = pos, "move started");
        self.state.phase = DevicePhase::Moving;
        self.state.goal_position = pos;
        self.delay = self.profile.next_delay(self.profile.initial_delay);
        self.next_step = Some(self.delay);
        Ok(vec![DeviceEvent::PositionUpdate {
            position: self.state.current_position,
            delay: self.delay,
        }])
    }

    /// Begin moving to position 0.
    pub fn move_to_zero(&mut self) -> Result<Vec<DeviceEvent>, DeviceError> {
        self.move_to(0)
    }

    /// Run one step of the motion simulation.
    ///
    /// While short of the goal, moves one unit and returns a
    /// `PositionUpdate` carrying the delay until the next step. At the goal,
    /// returns to `Idle` and emits `WorkComplete`. Does nothing when idle.
    pub fn advance(&mut self) -> Vec<DeviceEvent> {
        if self.state.phase != DevicePhase::Moving {
            return Vec::new();
        }

        let current = self.state.current_position;
        let goal = self.state.goal_position;

        if current == goal {
            tracing::debug!(position = current, "move complete");
            self.state.phase = DevicePhase::Idle;
            self.next_step = None;
            return vec![DeviceEvent::WorkComplete];
        }

        let position = current + (goal - current).signum();
        debug_assert!((0..=self.config.max_position()).contains(&position));
        self.state.current_position = position;
        self.delay = self.profile.next_delay(self.delay);
        self.next_step = Some(self.delay);

        vec![DeviceEvent::PositionUpdate { position, delay: self.delay }]
    }

    /// Answer a position query.
    ///
    /// With `lie_probability` percent chance, and only when away from 0, the
    /// true position is offset by up to [`LIE_SPREAD`] either way and clamped
    /// into `0..=max_position`. The true position is never modified.
    pub fn query_position(&self) -> i64 {
        let current = self.state.current_position;
        let roll = self.env.random_range(1, 100);

        if roll <= i64::from(self.config.lie_probability()) && current > 0 {
            let offset = self.env.random_range(-LIE_SPREAD, LIE_SPREAD);
            let reported = (current + offset).clamp(0, self.config.max_position());
            tracing::trace!(actual = current, reported, "position query perturbed");
            return reported;
        }

        current
    }

    /// Truthful init data for a newly connected client.
    pub fn client_init(&self) -> DeviceEvent {
        DeviceEvent::ClientInit {
            position: self.state.current_position,
            max_position: self.config.max_position(),
        }
    }

    fn move_to_into(&mut self, pos: i64, events: &mut Vec<DeviceEvent>) {
        match self.move_to(pos) {
            Ok(produced) => events.extend(produced),
            Err(err) => {
                tracing::debug!(%err, "move rejected");
                events.push(DeviceEvent::Error(err));
            },
        }
    }
}
