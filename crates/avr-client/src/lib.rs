//! Test client for the AVR emulator.
//!
//! Talks the same wire protocol as the device and keeps an independent
//! prediction of the true position, so dishonest position reports can be
//! told apart from honest ones.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod verifier;

pub use client::Client;
pub use error::ClientError;
pub use verifier::{Observation, Verifier};
