// Failure classification
//
// Pure function from a normalized provider error to a closed set of failure
// classes. Status codes win over message text; message-pattern matching only
// applies to transport-level failures that carry no status.

use std::time::Duration;

use foundersight_llm::ProviderError;

/// Classified failure of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Provider signaled throttling (HTTP 429); carries the provider's wait
    /// hint when one was supplied
    RateLimited { retry_after: Option<Duration> },
    /// Provider-side failure (5xx, 408, 504)
    ServerError { status: u16 },
    /// Network-level failure detected via message patterns
    Transient,
    /// Credentials rejected (401) - retrying with the same bad credentials
    /// cannot succeed, so this is never retried and never falls back
    FatalAuth,
    /// Everything else - never retried locally, may still fall back
    Fatal,
}

impl FailureClass {
    /// Whether the retry executor may try again locally
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureClass::RateLimited { .. } | FailureClass::ServerError { .. } | FailureClass::Transient
        )
    }

    /// Whether this failure hands off to fallback immediately when fallback
    /// is enabled (5xx-class upstream internal errors; 408 stays retry-local)
    pub fn triggers_fallback(&self) -> bool {
        matches!(self, FailureClass::ServerError { status } if *status >= 500)
    }
}

/// Message fragments that mark a transport-level failure as retryable
const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "connection failed",
    "connection closed",
    "network",
    "econnreset",
    "econnrefused",
    "socket hang up",
    "dns",
];

/// Bucket a normalized provider error into a failure class
pub fn classify(error: &ProviderError) -> FailureClass {
    if let Some(status) = error.status {
        return match status {
            429 => FailureClass::RateLimited {
                retry_after: error.retry_after,
            },
            401 => FailureClass::FatalAuth,
            408 | 504 => FailureClass::ServerError { status },
            s if (500..600).contains(&s) => FailureClass::ServerError { status },
            _ => FailureClass::Fatal,
        };
    }

    let message = error.message.to_lowercase();
    if TRANSIENT_PATTERNS.iter().any(|p| message.contains(p)) {
        FailureClass::Transient
    } else {
        FailureClass::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_with_hint() {
        let err = ProviderError::http(429, "slow down").with_retry_after(Duration::from_secs(12));
        assert_eq!(
            classify(&err),
            FailureClass::RateLimited {
                retry_after: Some(Duration::from_secs(12))
            }
        );
    }

    #[test]
    fn test_rate_limit_without_hint() {
        let err = ProviderError::http(429, "slow down");
        assert_eq!(
            classify(&err),
            FailureClass::RateLimited { retry_after: None }
        );
    }

    #[test]
    fn test_server_error_statuses() {
        for status in [500, 502, 503, 599, 408, 504] {
            let class = classify(&ProviderError::http(status, "upstream unhappy"));
            assert_eq!(class, FailureClass::ServerError { status }, "status {}", status);
            assert!(class.is_retryable());
        }
    }

    #[test]
    fn test_only_5xx_triggers_fallback() {
        assert!(classify(&ProviderError::http(500, "boom")).triggers_fallback());
        assert!(classify(&ProviderError::http(503, "overloaded")).triggers_fallback());
        assert!(!classify(&ProviderError::http(408, "request timeout")).triggers_fallback());
        assert!(!classify(&ProviderError::transport("connection reset")).triggers_fallback());
    }

    #[test]
    fn test_auth_failure_is_fatal_and_unretryable() {
        let class = classify(&ProviderError::http(401, "invalid api key"));
        assert_eq!(class, FailureClass::FatalAuth);
        assert!(!class.is_retryable());
        assert!(!class.triggers_fallback());
    }

    #[test]
    fn test_other_4xx_is_fatal() {
        assert_eq!(
            classify(&ProviderError::http(400, "bad request")),
            FailureClass::Fatal
        );
        assert_eq!(
            classify(&ProviderError::http(404, "model not found")),
            FailureClass::Fatal
        );
    }

    #[test]
    fn test_transport_patterns_are_transient() {
        for message in [
            "request timed out: deadline elapsed",
            "connection reset by peer",
            "connection refused",
            "network unreachable",
            "ECONNRESET while reading body",
        ] {
            assert_eq!(
                classify(&ProviderError::transport(message)),
                FailureClass::Transient,
                "message {:?}",
                message
            );
        }
    }

    #[test]
    fn test_unrecognized_transport_failure_is_fatal() {
        assert_eq!(
            classify(&ProviderError::transport("response contained no choices")),
            FailureClass::Fatal
        );
    }

    #[test]
    fn test_status_wins_over_message_text() {
        // A 401 whose body mentions a timeout is still an auth failure
        let err = ProviderError::http(401, "token validation timeout");
        assert_eq!(classify(&err), FailureClass::FatalAuth);
    }
}
