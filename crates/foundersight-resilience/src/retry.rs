// Retry executor
//
// Wraps a caller-supplied unit of work in a bounded attempt loop: each
// attempt races the work against a per-attempt timeout (and an optional
// cancellation signal), failures are classified and recorded with the
// circuit breaker, and the loop either waits out a computed delay or
// escalates to fallback/terminal failure.
//
// Timing semantics:
// - a provider-supplied rate-limit hint is slept exactly, with no jitter
// - otherwise backoff is min(base * 2^attempt, max_delay) scaled by an
//   additive jitter factor in [1.0, 1.1) - the sleep never undershoots the
//   nominal backoff

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use foundersight_llm::{redact, ProviderError};

use crate::circuit::CircuitBreaker;
use crate::classify::{classify, FailureClass};
use crate::error::{ResilienceError, Result};
use crate::fallback::FallbackCoordinator;

/// Wait applied to a rate-limit failure when the provider gives no hint
const RATE_LIMIT_DEFAULT_WAIT: Duration = Duration::from_secs(1);

/// Per-call retry configuration, supplied by the caller and never stored
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Retries after the first attempt; total attempts = max_retries + 1
    pub max_retries: u32,
    /// Nominal delay before the first retry
    pub base_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
    /// Per-attempt timeout; a lost race counts as a transient failure
    pub timeout: Duration,
    /// Whether a degraded primary may hand off to the alternate path
    pub enable_fallback: bool,
    /// Optional cancellation signal; a `true` value abandons the in-flight
    /// attempt and any pending retries
    pub cancel: Option<watch::Receiver<bool>>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
            enable_fallback: false,
            cancel: None,
        }
    }
}

impl RetryOptions {
    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base backoff delay
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the backoff ceiling
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable fallback for this call
    pub fn with_fallback(mut self, enable_fallback: bool) -> Self {
        self.enable_fallback = enable_fallback;
        self
    }

    /// Attach a cancellation signal
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Successful outcome of a resilient call
#[derive(Debug, Clone)]
pub struct RetryResult<T> {
    /// The value produced by the unit of work (or the alternate path)
    pub data: T,
    /// Primary-path attempts consumed
    pub attempts: u32,
    /// Wall-clock time spent, including all waits
    pub total_time: Duration,
    /// Whether the alternate path produced the value
    pub used_fallback: bool,
}

/// Executes units of work against the upstream provider with bounded
/// retries, timeout enforcement, and circuit gating
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use foundersight_resilience::{CircuitBreaker, RetryExecutor, RetryOptions};
///
/// let executor = RetryExecutor::new(Arc::new(CircuitBreaker::default()));
/// let result = executor
///     .execute(|| client.complete(&request), &RetryOptions::default())
///     .await?;
/// tracing::info!(attempts = result.attempts, "completion finished");
/// ```
#[derive(Debug)]
pub struct RetryExecutor {
    breaker: Arc<CircuitBreaker>,
}

impl RetryExecutor {
    /// Create an executor sharing the process-wide circuit breaker
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }

    /// The shared circuit breaker handle
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Execute the unit of work with no alternate path.
    ///
    /// With `enable_fallback` set, terminal failures still consult the
    /// coordinator, which reports `FallbackUnavailable` since no alternate
    /// is configured.
    pub async fn execute<T, W, WFut>(&self, work: W, options: &RetryOptions) -> Result<RetryResult<T>>
    where
        W: Fn() -> WFut,
        WFut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        self.execute_inner(work, None::<fn() -> WFut>, options).await
    }

    /// Execute the unit of work with an alternate path available.
    ///
    /// The alternate is only ever invoked when `options.enable_fallback` is
    /// set and the primary path is judged unusable.
    pub async fn execute_with_fallback<T, W, WFut, A, AFut>(
        &self,
        work: W,
        alternate: A,
        options: &RetryOptions,
    ) -> Result<RetryResult<T>>
    where
        W: Fn() -> WFut,
        WFut: Future<Output = std::result::Result<T, ProviderError>>,
        A: FnOnce() -> AFut,
        AFut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        self.execute_inner(work, Some(alternate), options).await
    }

    async fn execute_inner<T, W, WFut, A, AFut>(
        &self,
        work: W,
        alternate: Option<A>,
        options: &RetryOptions,
    ) -> Result<RetryResult<T>>
    where
        W: Fn() -> WFut,
        WFut: Future<Output = std::result::Result<T, ProviderError>>,
        A: FnOnce() -> AFut,
        AFut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let call_id = Uuid::new_v4();
        let started = Instant::now();
        let mut cancel = options.cancel.clone();
        let coordinator = FallbackCoordinator::new(call_id);

        // Gate on the breaker before consuming any attempt budget
        if let Err(open) = self.breaker.acquire() {
            if options.enable_fallback {
                debug!(call_id = %call_id, "circuit open, routing call straight to fallback");
                return coordinator.attempt(alternate, open, 0, started).await;
            }
            debug!(call_id = %call_id, "circuit open, failing fast");
            return Err(open);
        }

        let mut attempt: u32 = 0;
        loop {
            let error = match run_attempt(&work, options, &mut cancel).await? {
                Ok(data) => {
                    self.breaker.record_success();
                    debug!(
                        call_id = %call_id,
                        attempts = attempt + 1,
                        "upstream call succeeded"
                    );
                    return Ok(RetryResult {
                        data,
                        attempts: attempt + 1,
                        total_time: started.elapsed(),
                        used_fallback: false,
                    });
                }
                Err(error) => redact::sanitize(error),
            };

            let class = classify(&error);
            self.breaker.record_failure(&error);
            warn!(
                call_id = %call_id,
                attempt,
                class = ?class,
                error = %error,
                "upstream attempt failed"
            );

            // Bad credentials cannot be fixed by retrying or rerouting
            if class == FailureClass::FatalAuth {
                return Err(ResilienceError::FatalAuth { source: error });
            }

            if class.triggers_fallback() && options.enable_fallback {
                let original = ResilienceError::Fatal { source: error };
                return coordinator
                    .attempt(alternate, original, attempt + 1, started)
                    .await;
            }

            if class.is_retryable() && attempt < options.max_retries {
                let delay = compute_delay(&class, attempt, options);
                debug!(
                    call_id = %call_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "waiting before retry"
                );
                sleep_or_cancel(delay, &mut cancel).await?;
                attempt += 1;
                continue;
            }

            let terminal = if class.is_retryable() {
                ResilienceError::RetriesExhausted {
                    attempts: attempt + 1,
                    source: error,
                }
            } else {
                ResilienceError::Fatal { source: error }
            };

            if options.enable_fallback {
                return coordinator
                    .attempt(alternate, terminal, attempt + 1, started)
                    .await;
            }
            return Err(terminal);
        }
    }
}

/// Race one invocation of the work against the per-attempt timeout and the
/// optional cancellation signal. A lost timeout race is a transient failure;
/// cancellation aborts the call entirely.
async fn run_attempt<T, W, WFut>(
    work: &W,
    options: &RetryOptions,
    cancel: &mut Option<watch::Receiver<bool>>,
) -> Result<std::result::Result<T, ProviderError>>
where
    W: Fn() -> WFut,
    WFut: Future<Output = std::result::Result<T, ProviderError>>,
{
    let attempt = tokio::time::timeout(options.timeout, work());
    let raced = match cancel {
        Some(rx) => tokio::select! {
            res = attempt => res,
            _ = wait_cancelled(rx) => {
                info!("cancellation signal received, abandoning upstream call");
                return Err(ResilienceError::Cancelled);
            }
        },
        None => attempt.await,
    };

    Ok(match raced {
        Ok(result) => result,
        Err(_) => Err(ProviderError::transport(format!(
            "attempt timed out after {}ms",
            options.timeout.as_millis()
        ))),
    })
}

/// Sleep out a retry delay unless the cancellation signal fires first
async fn sleep_or_cancel(
    delay: Duration,
    cancel: &mut Option<watch::Receiver<bool>>,
) -> Result<()> {
    match cancel {
        Some(rx) => tokio::select! {
            _ = sleep(delay) => Ok(()),
            _ = wait_cancelled(rx) => Err(ResilienceError::Cancelled),
        },
        None => {
            sleep(delay).await;
            Ok(())
        }
    }
}

/// Resolve once the signal carries `true`. A dropped sender means
/// cancellation can no longer arrive, so the future pends forever rather
/// than spuriously cancelling the call.
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Delay before the next attempt. Provider-suggested waits are honored
/// exactly; everything else gets capped exponential backoff with jitter.
fn compute_delay(class: &FailureClass, attempt: u32, options: &RetryOptions) -> Duration {
    if let FailureClass::RateLimited { retry_after } = class {
        return retry_after.unwrap_or(RATE_LIMIT_DEFAULT_WAIT);
    }

    let nominal = options
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(options.max_delay);
    let jitter = rand::thread_rng().gen_range(1.0..1.1);
    nominal.mul_f64(jitter)
}
