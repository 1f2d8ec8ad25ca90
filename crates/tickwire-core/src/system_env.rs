//! Production Environment implementation using system time and RNG.
//!
//! # Capabilities
//!
//! - Real wall clock (`std::time::SystemTime`)
//! - OS cryptographic RNG (getrandom). Truly random, not reproducible
//! - Tokio async sleep for actual wall-clock delays

use std::time::Duration;

use crate::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness.
/// Suitable for nonces, ephemeral agreement keys, identity seeds and request
/// identifiers.
///
/// # Panics
///
/// Panics if the OS RNG fails. An endpoint without functioning
/// cryptographic randomness cannot seal a single message, so there is
/// nothing to recover to.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn wall_clock_ms(&self) -> u64 {
        // A clock before 1970 reads as the epoch rather than aborting.
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - endpoint cannot operate securely");
    }
}
