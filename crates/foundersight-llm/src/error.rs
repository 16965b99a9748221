// Normalized upstream provider errors
//
// Every failure coming back from an LLM provider is reduced to this shape
// before the resilience layer sees it: an optional HTTP status, a message,
// and an optional provider-supplied wait hint. Classification into retryable
// vs. fatal buckets happens downstream on this normalized form.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for provider-boundary operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A failure reported by (or on the way to) the upstream provider.
///
/// `status` is present when the failure was HTTP-shaped; transport-level
/// failures (DNS, connect, timeout) carry only a message. `retry_after` is
/// populated from the provider's `Retry-After` header when throttled.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// HTTP status code, if the failure was HTTP-shaped
    pub status: Option<u16>,
    /// Human-readable description, may include provider body text
    pub message: String,
    /// Provider-supplied wait hint, if any
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    /// Create an error for a non-success HTTP response
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: format!("provider returned HTTP {}: {}", status, message.into()),
            retry_after: None,
        }
    }

    /// Create an error for a transport-level failure (no HTTP status)
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attach a provider-supplied wait hint
    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    /// Whether the failure carried an HTTP status
    pub fn is_http(&self) -> bool {
        self.status.is_some()
    }
}
