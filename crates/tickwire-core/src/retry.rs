//! Bounded retry.
//!
//! A [`RetryPolicy`] names how many attempts to make, how long to wait
//! between them and which errors are worth retrying. [`retry`] runs an async
//! operation under a policy, sleeping through the [`Environment`] so tests
//! observe the schedule without waiting.

use std::{future::Future, time::Duration};

use crate::env::Environment;

/// Default attempts for connection establishment.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Default delay between connection attempts.
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(2);

/// Default attempts for rate-limited data-source calls.
pub const DEFAULT_RATE_LIMIT_ATTEMPTS: u32 = 3;

/// Default first backoff for rate-limited data-source calls.
pub const DEFAULT_RATE_LIMIT_BASE: Duration = Duration::from_secs(1);

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure
    Fixed(Duration),
    /// `base * 2^(n-1)` after the n-th failure
    Exponential {
        /// Delay after the first failure
        base: Duration,
    },
}

impl Backoff {
    /// Delay after `failures` failed attempts (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base } => {
                let shift = failures.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << shift)
            },
        }
    }
}

/// Retry policy: attempts, schedule and retryable-error predicate.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy<E> {
    /// Total attempts including the first; zero behaves like one
    pub max_attempts: u32,
    /// Delay schedule
    pub backoff: Backoff,
    /// Whether an error may be retried
    pub retryable: fn(&E) -> bool,
}

impl<E> RetryPolicy<E> {
    /// Retry every error with a fixed delay.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, backoff: Backoff::Fixed(delay), retryable: |_| true }
    }

    /// Retry every error with exponential backoff.
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self { max_attempts, backoff: Backoff::Exponential { base }, retryable: |_| true }
    }

    /// Only retry errors matching `predicate`.
    #[must_use]
    pub fn retry_if(mut self, predicate: fn(&E) -> bool) -> Self {
        self.retryable = predicate;
        self
    }

    /// Delay schedule the policy would follow if every attempt failed.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts.max(1)).map(|n| self.backoff.delay(n)).collect()
    }
}

/// Final failure of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError<E> {
    /// Attempts made
    pub attempts: u32,
    /// Error of the last attempt
    pub last: E,
}

/// Run `op` under `policy`.
///
/// `op` receives the 1-based attempt number. A non-retryable error is
/// returned after the attempt that produced it; no sleep follows the final
/// attempt.
pub async fn retry<Env, T, E, F, Fut>(
    env: &Env,
    policy: &RetryPolicy<E>,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    Env: Environment,
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= max_attempts || !(policy.retryable)(&error) {
                    return Err(RetryError { attempts: attempt, last: error });
                }

                let delay = policy.backoff.delay(attempt);
                tracing::debug!(attempt, max_attempts, ?delay, %error, "attempt failed, retrying");
                env.sleep(delay).await;
                attempt += 1;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingEnv;

    #[test]
    fn exponential_schedule_doubles() {
        let policy = RetryPolicy::<String>::exponential(4, Duration::from_secs(1));
        assert_eq!(
            policy.schedule(),
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn fixed_schedule_repeats() {
        let policy = RetryPolicy::<String>::fixed(3, Duration::from_secs(2));
        assert_eq!(policy.schedule(), vec![Duration::from_secs(2); 2]);
    }

    #[test]
    fn huge_exponent_saturates() {
        let backoff = Backoff::Exponential { base: Duration::from_secs(1) };
        assert!(backoff.delay(100) >= backoff.delay(32));
    }

    #[tokio::test]
    async fn succeeds_after_failures() {
        let env = RecordingEnv::default();
        let policy = RetryPolicy::fixed(3, Duration::from_secs(2));

        let result = retry(&env, &policy, |attempt| async move {
            if attempt < 3 { Err(format!("fail {attempt}")) } else { Ok(attempt) }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(env.sleeps(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn exhausted_reports_attempts_and_last_error() {
        let env = RecordingEnv::default();
        let policy = RetryPolicy::fixed(2, Duration::from_secs(2));

        let result: Result<(), _> =
            retry(&env, &policy, |attempt| async move { Err(format!("fail {attempt}")) }).await;

        assert_eq!(result, Err(RetryError { attempts: 2, last: "fail 2".to_string() }));
        assert_eq!(env.sleeps(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let env = RecordingEnv::default();
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1))
            .retry_if(|e: &String| e.starts_with("retry"));

        let result: Result<(), _> =
            retry(&env, &policy, |_| async { Err("fatal".to_string()) }).await;

        assert_eq!(result, Err(RetryError { attempts: 1, last: "fatal".to_string() }));
        assert!(env.sleeps().is_empty());
    }
}
