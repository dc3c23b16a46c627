//! Resilience error types.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the resilience primitives themselves.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError {
    /// The breaker rejected the call before it started.
    #[error("circuit breaker open (retry after {retry_after:?})")]
    CircuitBreakerOpen {
        /// Remaining cooldown, if the breaker is in `Open`; `None` when a
        /// `HalfOpen` probe quota was exceeded.
        retry_after: Option<Duration>,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

/// Terminal outcome of a retried operation, preserving the caller's error
/// type for classification upstream.
#[derive(Debug, Error)]
pub enum RetryError<E: std::fmt::Display> {
    /// Every permitted attempt failed.
    #[error("max attempts exhausted after {attempts} attempts: {source}")]
    Exhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The last attempt's error.
        source: E,
    },

    /// The first non-retryable error; surfaced without further attempts.
    #[error("{0}")]
    Aborted(E),

    /// Cancellation was observed during a backoff sleep.
    #[error("operation cancelled during retry backoff")]
    Cancelled,
}

impl<E: std::fmt::Display> RetryError<E> {
    /// The underlying operation error, if any.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } | Self::Aborted(source) => Some(source),
            Self::Cancelled => None,
        }
    }
}
