#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Resilience
//!
//! Retry and circuit-breaker wrappers around fallible async operations.
//!
//! - [`RetryPolicy`] — bounded attempts with exponential backoff and
//!   optional ±10% jitter; sleeps are cancellation-aware.
//! - [`CircuitBreaker`] — a three-state (Closed/Open/HalfOpen) breaker per
//!   logical target, with a [`BreakerRegistry`] for keyed lookup.
//!
//! Both are deliberately mechanism-only: what counts as retryable is decided
//! by the caller's classifier plus the policy's substring filter, and the
//! breaker only ever sees success/failure.

pub mod breaker;
pub mod error;
pub mod registry;
pub mod retry;

pub use breaker::{BreakerState, BreakerStats, CircuitBreaker, CircuitBreakerConfig};
pub use error::{ResilienceError, RetryError};
pub use registry::BreakerRegistry;
pub use retry::RetryPolicy;
