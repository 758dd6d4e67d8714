//! Fuzz target for the [`DeviceEngine`] state machine
//!
//! # Strategy
//!
//! - Request sequences: arbitrary codes and step counts, including values
//!   far outside the rail
//! - Interleaving: motion steps, queries and new requests in any order, so
//!   moves are requested while already moving
//! - Lie rolls: randomness is drawn from fuzzer-provided bytes
//!
//! # Invariants
//!
//! - `current_position` NEVER leaves `0..=max_position`
//! - Position only changes inside `advance()`, by exactly one unit
//! - A request while `Moving` NEVER changes the goal
//! - Reported positions stay within `LIE_SPREAD` of the truth
//! - Enough `advance()` calls always bring the device back to `Idle`

#![no_main]

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use arbitrary::Arbitrary;
use avr_core::{
    DeviceConfig, DeviceEngine, DeviceError, DeviceEvent, DevicePhase, Environment, LIE_SPREAD,
};
use avr_proto::Message;
use libfuzzer_sys::fuzz_target;

/// Environment whose randomness is the fuzz input itself.
#[derive(Clone)]
struct FuzzEnv {
    entropy: Arc<Mutex<(Vec<u8>, usize)>>,
}

impl Environment for FuzzEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let mut guard = self.entropy.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (bytes, cursor) = &mut *guard;
        for byte in buffer {
            *byte = if bytes.is_empty() { 0 } else { bytes[*cursor % bytes.len()] };
            *cursor = cursor.wrapping_add(1);
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum DeviceOp {
    Request { code: i8, steps: i16 },
    Advance,
    Query,
    ClientInit,
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    lie_probability: u8,
    max_position: u16,
    entropy: Vec<u8>,
    ops: Vec<DeviceOp>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(config) =
        DeviceConfig::new(i64::from(input.lie_probability), i64::from(input.max_position))
    else {
        return;
    };
    let max = config.max_position();
    let env = FuzzEnv { entropy: Arc::new(Mutex::new((input.entropy, 0))) };
    let mut engine = DeviceEngine::new(config, env);

    for op in input.ops {
        let before = engine.state();

        match op {
            DeviceOp::Request { code, steps } => {
                let events = engine.handle_message(Message::from_code(i64::from(code), i64::from(steps)));
                assert_eq!(engine.current_position(), before.current_position, "request moved device");

                let busy = events
                    .iter()
                    .any(|e| matches!(e, DeviceEvent::Error(DeviceError::AlreadyMoving { .. })));
                if busy {
                    assert_eq!(before.phase, DevicePhase::Moving);
                    assert_eq!(engine.goal_position(), before.goal_position, "goal replaced");
                }
                if before.phase == DevicePhase::Moving {
                    assert_eq!(engine.phase(), DevicePhase::Moving);
                    assert_eq!(engine.goal_position(), before.goal_position);
                }
            },
            DeviceOp::Advance => {
                engine.advance();
                let moved = engine.current_position().abs_diff(before.current_position);
                assert!(moved <= 1, "jumped {moved} units in one step");
            },
            DeviceOp::Query => {
                let reported = engine.query_position();
                assert!((0..=max).contains(&reported));
                assert!((reported - before.current_position).abs() <= LIE_SPREAD);
                if before.current_position == 0 {
                    assert_eq!(reported, 0);
                }
                assert_eq!(engine.state(), before, "query mutated state");
            },
            DeviceOp::ClientInit => {
                assert_eq!(engine.client_init(), DeviceEvent::ClientInit {
                    position: before.current_position,
                    max_position: max,
                });
            },
        }

        assert!((0..=max).contains(&engine.current_position()));
    }

    // every move terminates at its goal
    let goal = engine.goal_position();
    let was_moving = engine.phase() == DevicePhase::Moving;
    for _ in 0..=(max + 1) {
        if engine.phase() == DevicePhase::Idle {
            break;
        }
        engine.advance();
    }
    assert_eq!(engine.phase(), DevicePhase::Idle);
    if was_moving {
        assert_eq!(engine.current_position(), goal);
    }
});
