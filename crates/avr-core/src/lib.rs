//! Core logic of the AVR device emulator.
//!
//! This crate holds the device itself, with no sockets and no runtime:
//!
//! - [`DeviceEngine`]: action-based state machine simulating a linear
//!   positioning device (motion with a decaying step delay, range checks,
//!   probabilistic dishonest position reports)
//! - [`DeviceConfig`] / [`MotionProfile`]: validated device parameters
//! - [`Environment`]: injectable time and randomness, so lie injection can
//!   be made deterministic in tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod device;
pub mod env;
pub mod error;

pub use config::{DeviceConfig, LIE_SPREAD, MotionProfile};
pub use device::{DeviceEngine, DeviceEvent, DevicePhase, DeviceState};
pub use env::Environment;
pub use error::{ConfigError, DeviceError};
