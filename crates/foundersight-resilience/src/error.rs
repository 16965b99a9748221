// Error types for the resilience layer
//
// These are the terminal, caller-facing failures. The retryable buckets
// (rate limit, server error, transient) live in classify::FailureClass and
// never escape the retry loop directly - they surface here as
// RetriesExhausted or Fatal once the loop gives up.

use std::time::Duration;
use thiserror::Error;

use foundersight_llm::ProviderError;

/// Result type alias for resilience-layer operations
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Terminal failures reported to callers
///
/// CircuitOpen and RetriesExhausted are distinct, catchable conditions so
/// calling code can tell "upstream is down" apart from "this specific
/// request failed". Every embedded provider error has already been through
/// secret redaction.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError {
    /// The circuit breaker rejected the call outright; carries the remaining
    /// wait before a probe will be admitted
    #[error("upstream circuit is open; retry in {}ms", retry_after.as_millis())]
    CircuitOpen { retry_after: Duration },

    /// Upstream rejected the credentials - never retried, never falls back
    #[error("upstream authentication failed: {source}")]
    FatalAuth { source: ProviderError },

    /// Upstream failure that will not be retried locally
    #[error("upstream call failed: {source}")]
    Fatal { source: ProviderError },

    /// Attempt budget spent without a success; carries the last failure
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted { attempts: u32, source: ProviderError },

    /// No alternate path configured, or the alternate path itself failed;
    /// carries the primary-path failure that triggered the fallback
    #[error("fallback unavailable: {source}")]
    FallbackUnavailable { source: Box<ResilienceError> },

    /// The caller's cancellation signal fired mid-call
    #[error("upstream call cancelled")]
    Cancelled,
}

impl ResilienceError {
    /// Whether this failure means the circuit rejected the call without
    /// invoking the unit of work
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// Remaining wait before the circuit will admit a probe, if known
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ResilienceError::CircuitOpen { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
