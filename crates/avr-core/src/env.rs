//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the device engine from system resources
//! (time and randomness). This enables:
//!
//! - Deterministic tests: a seeded RNG makes lie injection reproducible, so
//!   tests can assert exact perturbations.
//!
//! - Production runtime: the server's `SystemEnv` uses OS entropy and tokio
//!   time without any change to the engine.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

/// Abstract environment providing time, randomness, and async sleeping.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: Subsequent calls must return times >= previous calls.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; the engine itself never sleeps.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Determinism during tests: Given the same RNG seed, this produces the
    ///   same sequence of bytes
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random integer in `min..=max`.
    ///
    /// Returns `min` when the range is empty or inverted.
    fn random_range(&self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max.abs_diff(min).saturating_add(1);
        let offset = self.random_u64() % span;
        min.wrapping_add_unsigned(offset)
    }
}
