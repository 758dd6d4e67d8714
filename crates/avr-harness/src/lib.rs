//! Deterministic simulation harness for the AVR emulator.
//!
//! This crate provides Turmoil-based implementations of the `Environment`
//! and `Transport` traits, so the real server runs over simulated TCP with
//! virtual time and a seeded RNG.
//!
//! Virtual time matters here: a single move of a few dozen steps takes
//! seconds of wall-clock time on a real device, and lie injection is random.
//! In the simulation both become instant and reproducible.
//!
//! # Example
//!
//! ```rust,ignore
//! use avr_core::{DeviceConfig, DeviceEngine};
//! use avr_harness::{SimEnv, SimTransport};
//! use avr_server::Server;
//!
//! let mut sim = turmoil::Builder::new().build();
//!
//! sim.host("server", || async {
//!     let transport = SimTransport::bind("0.0.0.0:28338").await?;
//!     let engine = DeviceEngine::new(DeviceConfig::default(), SimEnv::new());
//!     Server::with_transport(transport, engine).run().await?;
//!     Ok(())
//! });
//!
//! sim.client("client", async {
//!     let stream = SimTransport::connect_to("server:28338").await?;
//!     // drive an avr_client::Client over `stream`...
//!     Ok(())
//! });
//!
//! sim.run().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod sim_env;
mod sim_transport;

pub use sim_env::SimEnv;
pub use sim_transport::SimTransport;
