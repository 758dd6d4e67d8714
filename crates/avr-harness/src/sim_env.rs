//! Turmoil-based Environment implementation for deterministic testing.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use avr_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Simulation environment using Turmoil's virtual time and seeded RNG.
///
/// - **Virtual Time**: `now()` and `sleep()` go through tokio's clock, which
///   Turmoil drives, so a ten-second move finishes instantly.
///
/// - **Seeded RNG**: lie rolls come from a ChaCha20Rng with a fixed seed, so
///   a dishonest device reports the same sequence on every run.
///
/// # Usage
///
/// `SimEnv` is meant to live inside a Turmoil host. Randomness works
/// anywhere; time only advances inside a simulation.
#[derive(Clone)]
pub struct SimEnv {
    /// Clones share one RNG so the sequence does not restart per clone.
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SimEnv {
    /// Create a new SimEnv with default seed (0)
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a new SimEnv with a specific seed
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn random_bytes(&self, dest: &mut [u8]) {
        // Turmoil is single threaded; a poisoned lock still holds a usable RNG.
        self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner).fill_bytes(dest);
    }
}
