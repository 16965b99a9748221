// Circuit breaker (availability tracker)
//
// Owns the only shared mutable state in the subsystem: the circuit state and
// the sliding failure window. One instance exists per process, constructed
// at startup and handed to every caller as an Arc; a fresh process always
// starts closed. All state operations take a short mutex critical section
// and never await while holding the lock.
//
// State machine:
//   closed    --[window >= failure_threshold]--> open
//   open      --[elapsed >= open_timeout]-----> half-open
//   half-open --[successes >= success_threshold]--> closed
//   half-open --[any failure]------------------> open

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use foundersight_llm::{redact, ProviderError};

use crate::error::ResilienceError;

/// Circuit state
///
/// Exactly one state holds at any time; transitions happen only inside the
/// breaker, never by assignment from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Rejecting calls
    Open,
    /// Probationary, limited calls allowed
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Immutable breaker configuration, created once at startup
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Recent failures that force closed -> open
    pub failure_threshold: u32,
    /// Consecutive half-open successes required to close
    pub success_threshold: u32,
    /// Time the circuit stays open before a probe is admitted
    pub open_timeout: Duration,
    /// Sliding window over which failures are counted
    pub window: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            window: Duration::from_secs(300),
        }
    }
}

impl CircuitConfig {
    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the success threshold
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the open-state timeout
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the monitoring window
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

/// Point-in-time health view for monitoring/dashboards
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// False only while the circuit is rejecting calls
    pub healthy: bool,
    pub circuit_state: CircuitState,
    /// Failures inside the monitoring window
    pub recent_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    /// Timestamps of recent failures, pruned to the monitoring window on
    /// every read
    failures: VecDeque<Instant>,
    /// Consecutive successes observed during the current probation
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker guarding the upstream provider
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use foundersight_resilience::{CircuitBreaker, CircuitConfig};
///
/// // Application startup wiring - one breaker per process
/// let breaker = Arc::new(CircuitBreaker::new(CircuitConfig::default()));
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    /// Create a breaker with the given configuration, starting closed
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                half_open_successes: 0,
                last_failure: None,
            }),
        }
    }

    /// Get the breaker configuration
    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Whether the upstream provider should currently be called.
    ///
    /// True unless the circuit is open with the open-timeout not yet
    /// elapsed; once the timeout has elapsed a probe would be admitted, so
    /// this reports available even though the half-open transition itself
    /// only happens inside `acquire`.
    pub fn is_available(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Open => Self::open_elapsed(&inner) >= self.config.open_timeout,
            _ => true,
        }
    }

    /// Gate a call on the circuit.
    ///
    /// Closed and half-open pass. Open transitions to half-open when the
    /// open-timeout has elapsed since the last failure (applied exactly once
    /// even under concurrent racers - the mutex serializes the check); until
    /// then the call is rejected with the remaining wait.
    pub fn acquire(&self) -> Result<(), ResilienceError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = Self::open_elapsed(&inner);
                if elapsed >= self.config.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    info!("circuit entering half-open probation");
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitOpen {
                        retry_after: self.config.open_timeout - elapsed,
                    })
                }
            }
        }
    }

    /// Record a successful call.
    ///
    /// During half-open probation, successes count toward the success
    /// threshold and close the circuit (clearing the window) once reached.
    /// While closed, a single success does not erase a building failure
    /// pattern - the window decides, not a counter reset.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        Self::prune(&mut inner.failures, now, self.config.window);

        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.success_threshold {
                inner.state = CircuitState::Closed;
                inner.failures.clear();
                inner.half_open_successes = 0;
                info!("circuit closed after successful probation");
            }
        }
    }

    /// Record a failed call.
    ///
    /// A single failure during half-open probation reopens the circuit
    /// immediately. While closed, the circuit opens once the pruned window
    /// reaches the failure threshold.
    pub fn record_failure(&self, error: &ProviderError) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.failures.push_back(now);
        inner.last_failure = Some(now);
        Self::prune(&mut inner.failures, now, self.config.window);

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                warn!(
                    error = %redact::sanitize_message(&error.message),
                    "circuit reopened by failure during probation"
                );
            }
            CircuitState::Closed => {
                if inner.failures.len() as u32 >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        recent_failures = inner.failures.len(),
                        threshold = self.config.failure_threshold,
                        error = %redact::sanitize_message(&error.message),
                        "circuit opened after repeated upstream failures"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Point-in-time health snapshot for monitoring/dashboards
    pub fn status(&self) -> HealthSnapshot {
        let mut inner = self.inner.lock().unwrap();
        Self::prune(&mut inner.failures, Instant::now(), self.config.window);
        let recent_failures = inner.failures.len();

        let (healthy, reason) = match inner.state {
            CircuitState::Closed => (true, None),
            CircuitState::HalfOpen => (
                true,
                Some("circuit half-open, probing upstream recovery".to_string()),
            ),
            CircuitState::Open => {
                let remaining = self
                    .config
                    .open_timeout
                    .saturating_sub(Self::open_elapsed(&inner));
                (
                    false,
                    Some(format!(
                        "circuit open after {} recent upstream failures; next probe in {}s",
                        recent_failures,
                        remaining.as_secs()
                    )),
                )
            }
        };

        HealthSnapshot {
            healthy,
            circuit_state: inner.state,
            recent_failures,
            reason,
            checked_at: Utc::now(),
        }
    }

    /// Operator-triggered force reset to closed with cleared counters, for
    /// manual recovery after a confirmed upstream fix
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.failures.clear();
        inner.half_open_successes = 0;
        inner.last_failure = None;
        info!("circuit force-reset to closed");
    }

    fn open_elapsed(inner: &CircuitInner) -> Duration {
        inner
            .last_failure
            .map(|at| at.elapsed())
            .unwrap_or(Duration::MAX)
    }

    fn prune(failures: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = failures.front() {
            if now.duration_since(*oldest) > window {
                failures.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, sleep};

    fn failure() -> ProviderError {
        ProviderError::http(503, "service unavailable")
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitConfig::default()
                .with_failure_threshold(3)
                .with_success_threshold(2)
                .with_open_timeout(Duration::from_secs(30))
                .with_window(Duration::from_secs(300)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_failures() {
        let cb = breaker();
        cb.record_failure(&failure());
        cb.record_failure(&failure());
        assert!(cb.is_available());

        cb.record_failure(&failure());
        assert!(!cb.is_available());
        assert_eq!(cb.status().circuit_state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_rejects_with_remaining_wait_while_open() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure(&failure());
        }

        advance(Duration::from_secs(10)).await;
        let err = cb.acquire().unwrap_err();
        let wait = err.retry_after().unwrap();
        assert!(wait <= Duration::from_secs(20));
        assert!(wait > Duration::from_secs(19));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_to_half_open_after_timeout() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure(&failure());
        }
        assert!(cb.acquire().is_err());

        sleep(Duration::from_secs(30)).await;
        assert!(cb.is_available());
        assert!(cb.acquire().is_ok());
        assert_eq!(cb.status().circuit_state, CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_transition_does_not_double_reset_probation() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure(&failure());
        }
        sleep(Duration::from_secs(30)).await;

        // First racer transitions to half-open, second passes through without
        // resetting the probation counter
        assert!(cb.acquire().is_ok());
        cb.record_success();
        assert!(cb.acquire().is_ok());
        cb.record_success();

        assert_eq!(cb.status().circuit_state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_during_probation_reopens() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure(&failure());
        }
        sleep(Duration::from_secs(30)).await;
        assert!(cb.acquire().is_ok());

        cb.record_success();
        cb.record_failure(&failure());
        assert_eq!(cb.status().circuit_state, CircuitState::Open);
        assert!(!cb.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probation_successes_close_and_clear_window() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure(&failure());
        }
        sleep(Duration::from_secs(30)).await;
        assert!(cb.acquire().is_ok());

        cb.record_success();
        cb.record_success();

        let status = cb.status();
        assert_eq!(status.circuit_state, CircuitState::Closed);
        assert_eq!(status.recent_failures, 0);
        assert!(status.healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_prunes_old_failures() {
        let cb = breaker();
        cb.record_failure(&failure());
        cb.record_failure(&failure());

        // Push the first two failures out of the monitoring window
        advance(Duration::from_secs(301)).await;
        assert_eq!(cb.status().recent_failures, 0);

        // A fresh failure alone does not reach the threshold
        cb.record_failure(&failure());
        assert_eq!(cb.status().circuit_state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_while_closed_does_not_erase_failure_pattern() {
        let cb = breaker();
        cb.record_failure(&failure());
        cb.record_failure(&failure());
        cb.record_success();
        cb.record_failure(&failure());

        // Two failures plus one more still cross the threshold of three
        assert_eq!(cb.status().circuit_state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_forces_closed_and_clears_counters() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure(&failure());
        }
        assert!(!cb.is_available());

        cb.reset();
        let status = cb.status();
        assert_eq!(status.circuit_state, CircuitState::Closed);
        assert_eq!(status.recent_failures, 0);
        assert!(status.healthy);
        assert!(cb.acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_open_reason() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure(&failure());
        }

        let status = cb.status();
        assert!(!status.healthy);
        let reason = status.reason.unwrap();
        assert!(reason.contains("3 recent upstream failures"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_serializes_for_dashboards() {
        let cb = breaker();
        cb.record_failure(&failure());

        let json = serde_json::to_value(cb.status()).unwrap();
        assert_eq!(json["healthy"], true);
        assert_eq!(json["circuit_state"], "closed");
        assert_eq!(json["recent_failures"], 1);
    }
}
