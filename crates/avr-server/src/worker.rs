//! Device worker.
//!
//! The [`DeviceEngine`] is owned by a single tokio task for its whole
//! lifetime. Everything else talks to it through a [`DeviceHandle`]:
//! commands go in over one channel and events come back, in order, over
//! another. Ownership is what makes the engine single-mutator, so no lock is
//! involved.
//!
//! The task waits on two things at once: the next command and the deadline
//! of the next motion step. Commands that arrive mid-move are therefore
//! handled right away (a position query is answered, a second move is
//! refused) instead of waiting for the move to finish.
//!
//! Every event is addressed to a session. Replies go to the session that
//! sent the command; motion events and the final `WorkComplete` go to the
//! session whose request started the move, even if it has since left.

use std::time::Instant;

use avr_core::{DeviceEngine, DeviceEvent, DeviceState, Environment};
use avr_proto::Message;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::error::ServerError;

/// Identifier distinguishing successive client sessions.
pub type SessionId = u64;

/// Requests accepted by the device worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// A decoded client request
    Message {
        /// Session that sent it
        session_id: SessionId,
        /// The request
        msg: Message,
    },
    /// Ask for truthful init data for a new client
    ClientInit {
        /// Session being initialized
        session_id: SessionId,
    },
}

impl DeviceCommand {
    fn session_id(&self) -> SessionId {
        match self {
            Self::Message { session_id, .. } | Self::ClientInit { session_id } => *session_id,
        }
    }
}

/// A device event and the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Session the event is meant for
    pub session_id: SessionId,
    /// The event
    pub event: DeviceEvent,
}

/// Cloneable handle for sending commands to the device worker.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    commands: mpsc::UnboundedSender<DeviceCommand>,
    state: watch::Receiver<DeviceState>,
}

impl DeviceHandle {
    /// Forward a client request to the device.
    pub fn send_message(&self, session_id: SessionId, msg: Message) -> Result<(), ServerError> {
        self.send(DeviceCommand::Message { session_id, msg })
    }

    /// Ask the device to emit a `ClientInit` event for `session_id`.
    pub fn request_client_init(&self, session_id: SessionId) -> Result<(), ServerError> {
        self.send(DeviceCommand::ClientInit { session_id })
    }

    /// Latest published device state.
    pub fn state(&self) -> DeviceState {
        *self.state.borrow()
    }

    /// Receiver notified after every state change, for display purposes.
    pub fn watch_state(&self) -> watch::Receiver<DeviceState> {
        self.state.clone()
    }

    fn send(&self, command: DeviceCommand) -> Result<(), ServerError> {
        self.commands.send(command).map_err(|_| ServerError::DeviceStopped)
    }
}

/// Task that owns and drives a [`DeviceEngine`].
pub struct DeviceWorker<E: Environment> {
    engine: DeviceEngine<E>,
    env: E,
    commands: mpsc::UnboundedReceiver<DeviceCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<DeviceState>,
}

/// Spawn a worker for `engine` on the current tokio runtime.
///
/// Returns the command handle, the ordered event stream, and the task handle.
/// The worker exits once every `DeviceHandle` is dropped and any in-flight
/// move has finished.
pub fn spawn_device<E: Environment>(
    engine: DeviceEngine<E>,
) -> (DeviceHandle, mpsc::UnboundedReceiver<SessionEvent>, JoinHandle<()>) {
    let env = engine.env().clone();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(engine.state());

    let worker = DeviceWorker {
        engine,
        env,
        commands: command_rx,
        events: event_tx,
        state: state_tx,
    };
    let task = tokio::spawn(worker.run());

    (DeviceHandle { commands: command_tx, state: state_rx }, event_rx, task)
}

impl<E: Environment> DeviceWorker<E> {
    /// Process commands and motion steps until shut down.
    pub async fn run(mut self) {
        // deadline of the next step and the session that started the move
        let mut motion: Option<(Instant, SessionId)> = None;
        let mut accepting = true;

        loop {
            if !accepting && motion.is_none() {
                break;
            }

            let env = &self.env;
            let step_due = async move {
                match motion {
                    Some((at, owner)) => {
                        env.sleep(at.saturating_duration_since(env.now())).await;
                        owner
                    },
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                command = self.commands.recv(), if accepting => match command {
                    Some(command) => {
                        let session_id = command.session_id();
                        let events = self.execute(command);
                        self.publish(session_id, events);
                        if motion.is_none() {
                            motion = self.schedule_next_step().map(|at| (at, session_id));
                        }
                    },
                    None => {
                        tracing::debug!("device handle dropped; finishing current move");
                        accepting = false;
                    },
                },

                owner = step_due => {
                    let events = self.engine.advance();
                    self.publish(owner, events);
                    motion = self.schedule_next_step().map(|at| (at, owner));
                },
            }
        }

        tracing::debug!("device worker stopped");
    }

    fn execute(&mut self, command: DeviceCommand) -> Vec<DeviceEvent> {
        match command {
            DeviceCommand::Message { session_id, msg } => {
                tracing::debug!(session_id, kind = ?msg.kind(), steps = msg.steps(), "device request");
                self.engine.handle_message(msg)
            },
            DeviceCommand::ClientInit { .. } => vec![self.engine.client_init()],
        }
    }

    fn schedule_next_step(&self) -> Option<Instant> {
        self.engine.next_step_delay().map(|delay| self.env.now() + delay)
    }

    fn publish(&self, session_id: SessionId, events: Vec<DeviceEvent>) {
        self.state.send_replace(self.engine.state());

        for event in events {
            if let DeviceEvent::PositionUpdate { position, delay } = &event {
                tracing::trace!(position, delay_ms = delay.as_millis() as u64, "position");
            }
            if self.events.send(SessionEvent { session_id, event }).is_err() {
                tracing::debug!("event receiver dropped");
                return;
            }
        }
    }
}
