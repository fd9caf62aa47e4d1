//! Environment abstraction supplying time and randomness.
//!
//! Core logic never reaches for the system clock or RNG directly; callers
//! inject an [`Environment`], so tests can substitute deterministic
//! implementations.

use std::future::Future;
use std::time::{Duration, Instant};

/// Time and randomness, supplied by the caller.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Sleep for the given duration.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with cryptographically secure random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);
}

/// Production environment: system clock, tokio timers, OS-seeded RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a system environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(buffer);
    }
}
