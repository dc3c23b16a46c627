//! Bounded retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::RetryError;

/// Retry configuration and driver.
///
/// Attempt numbering is 1-based: attempt 1 runs immediately, attempt `n > 1`
/// is preceded by `min(initial × multiplier^(n-2), max_delay)` of sleep
/// (±10% jitter when enabled).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    /// Backoff ceiling.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Exponential growth factor.
    pub multiplier: f64,
    /// Whether to apply ±10% jitter to each sleep.
    pub jitter: bool,
    /// Substrings identifying retryable errors; empty means every error
    /// the caller classifies as retryable is retried.
    #[serde(default)]
    pub retryable_errors: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            retryable_errors: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Base backoff before retry number `retry` (1-indexed after the first
    /// call): `min(initial × multiplier^(retry-1), max_delay)`.
    ///
    /// The first attempt consumes no delay; `delay_for(1)` is the sleep
    /// before attempt 2. Jitter is applied on top of this at sleep time,
    /// see [`jittered_delay_for`](Self::jittered_delay_for).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = retry.saturating_sub(1);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }

    /// [`delay_for`](Self::delay_for) with ±10% jitter applied when enabled.
    #[must_use]
    pub fn jittered_delay_for(&self, retry: u32) -> Duration {
        let base = self.delay_for(retry);
        if !self.jitter || base.is_zero() {
            return base;
        }
        Duration::from_secs_f64(base.as_secs_f64() * rand::rng().random_range(0.9..=1.1))
    }

    /// Whether `error_text` matches the retryable-error filter.
    #[must_use]
    pub fn matches_retryable(&self, error_text: &str) -> bool {
        self.retryable_errors.is_empty()
            || self
                .retryable_errors
                .iter()
                .any(|needle| error_text.contains(needle.as_str()))
    }

    /// Run `operation` under this policy.
    ///
    /// `operation` receives the 1-based attempt number. An error is retried
    /// only when `is_retryable` says so *and* it matches the policy's
    /// substring filter; otherwise it is surfaced as [`RetryError::Aborted`]
    /// immediately. Backoff sleeps race against `cancellation`.
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancellation: &CancellationToken,
        is_retryable: impl Fn(&E) -> bool,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let retryable =
                        is_retryable(&error) && self.matches_retryable(&error.to_string());
                    if !retryable {
                        return Err(RetryError::Aborted(error));
                    }
                    if attempt >= max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            source: error,
                        });
                    }

                    let delay = self.jittered_delay_for(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error,
                        "attempt failed, backing off before retry");
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancellation.cancelled() => return Err(RetryError::Cancelled),
                    }
                    attempt += 1;
                }
            }
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
