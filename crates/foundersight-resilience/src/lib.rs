// Upstream Resilience Layer for Foundersight
//
// Every call the platform makes to its LLM provider goes through this crate:
// - CircuitBreaker: process-wide availability tracking (closed/open/half-open
//   with a sliding failure window)
// - RetryExecutor: bounded retries with per-attempt timeouts, exponential
//   backoff, jitter, and rate-limit-aware waiting
// - FallbackCoordinator: opt-in hand-off to an alternate execution path when
//   the primary provider is degraded
//
// The subsystem is an in-process library boundary, not a network service.
// Callers hand it a zero-argument async unit of work (the prepared provider
// call) plus per-call options, and get back either a value with
// attempt/timing metadata or one clearly-typed failure.

pub mod circuit;
pub mod classify;
pub mod error;
mod fallback;
pub mod retry;

// Re-exports
pub use circuit::{CircuitBreaker, CircuitConfig, CircuitState, HealthSnapshot};
pub use classify::{classify, FailureClass};
pub use error::{ResilienceError, Result};
pub use retry::{RetryExecutor, RetryOptions, RetryResult};
