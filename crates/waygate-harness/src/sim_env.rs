//! Environment on tokio's clock.
//!
//! Under `#[tokio::test(start_paused = true)]` time only moves when every
//! task is idle, so timing-dependent scenarios run instantly and
//! reproducibly.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;
use waygate_core::Environment;

/// 2023-11-14T22:13:20Z, an arbitrary fixed wall-clock origin.
pub const DEFAULT_BASE_MS: u64 = 1_700_000_000_000;

/// Seeded, virtual-time [`Environment`].
#[derive(Debug, Clone)]
pub struct SimEnv {
    base_ms: u64,
    origin: Instant,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment whose clock starts at [`DEFAULT_BASE_MS`].
    pub fn with_seed(seed: u64) -> Self {
        Self::with_base(seed, DEFAULT_BASE_MS)
    }

    /// Environment whose clock starts at `base_ms`.
    pub fn with_base(seed: u64, base_ms: u64) -> Self {
        Self {
            base_ms,
            origin: Instant::now(),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Environment for SimEnv {
    fn now_ms(&self) -> u64 {
        self.base_ms + self.origin.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
