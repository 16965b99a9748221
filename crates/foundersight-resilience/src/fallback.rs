// Fallback coordinator
//
// Runs the caller-supplied alternate execution path when the primary
// provider path is judged unusable (circuit open, immediate 5xx hand-off,
// exhausted retries, or a non-retryable failure). The alternate is a
// per-call async closure - which secondary provider (if any) backs it is a
// caller wiring concern, so deterministic single-provider behavior stays a
// matter of simply not supplying one.

use std::future::Future;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use foundersight_llm::{redact, ProviderError};

use crate::error::{ResilienceError, Result};
use crate::retry::RetryResult;

/// Coordinates the hand-off from the primary path to an alternate one
#[derive(Debug)]
pub struct FallbackCoordinator {
    call_id: Uuid,
}

impl FallbackCoordinator {
    pub(crate) fn new(call_id: Uuid) -> Self {
        Self { call_id }
    }

    /// Attempt the alternate path after a primary-path failure.
    ///
    /// The primary failure is what triggered the hand-off and is the
    /// diagnostically relevant cause, so it is the error reported when the
    /// alternate is missing or fails; the alternate's own failure is logged
    /// but never surfaced as the final cause.
    pub(crate) async fn attempt<T, A, AFut>(
        &self,
        alternate: Option<A>,
        original: ResilienceError,
        attempts: u32,
        started: Instant,
    ) -> Result<RetryResult<T>>
    where
        A: FnOnce() -> AFut,
        AFut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let Some(alternate) = alternate else {
            warn!(call_id = %self.call_id, "no alternate path configured for fallback");
            return Err(ResilienceError::FallbackUnavailable {
                source: Box::new(original),
            });
        };

        info!(
            call_id = %self.call_id,
            error = %original,
            "primary path unusable, attempting fallback"
        );

        match alternate().await {
            Ok(data) => {
                info!(call_id = %self.call_id, attempts, "fallback path succeeded");
                Ok(RetryResult {
                    data,
                    attempts,
                    total_time: started.elapsed(),
                    used_fallback: true,
                })
            }
            Err(alternate_error) => {
                let alternate_error = redact::sanitize(alternate_error);
                warn!(
                    call_id = %self.call_id,
                    error = %alternate_error,
                    "fallback path failed"
                );
                Err(ResilienceError::FallbackUnavailable {
                    source: Box::new(original),
                })
            }
        }
    }
}
