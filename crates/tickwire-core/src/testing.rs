//! Recording environment for tests.
//!
//! Sleeps return immediately, advance the virtual wall clock and are
//! appended to a shared log, so tests can assert the exact delay schedule of
//! a retry loop.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::env::Environment;

/// Environment with a controllable clock and recorded sleeps.
#[derive(Debug, Clone)]
pub struct RecordingEnv {
    clock_ms: Arc<AtomicU64>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingEnv {
    /// Start the virtual clock at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self { clock_ms: Arc::new(AtomicU64::new(start_ms)), sleeps: Arc::default() }
    }

    /// Move the clock forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        self.clock_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_else(|e| e.into_inner().clone())
    }
}

impl Default for RecordingEnv {
    fn default() -> Self {
        Self::new(1_700_000_000_000)
    }
}

impl Environment for RecordingEnv {
    fn wall_clock_ms(&self) -> u64 {
        self.clock_ms.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        match self.sleeps.lock() {
            Ok(mut sleeps) => sleeps.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
        self.advance(duration);
        std::future::ready(())
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG available in tests");
    }
}
