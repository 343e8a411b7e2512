//! Per-collaborator circuit breaker.
//!
//! ```text
//! Closed   -> Open:     failure_count reaches threshold
//! Open     -> HalfOpen: can_execute() after reset_timeout since last failure
//! HalfOpen -> Closed:   probe succeeds (failure count reset)
//! HalfOpen -> Open:     probe fails (count kept, timer restarts)
//! ```
//!
//! The breaker never runs the guarded operation itself; callers report
//! outcomes through [`CircuitBreaker::record_success`] and
//! [`CircuitBreaker::record_failure`].

use super::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    #[default]
    Closed,
    /// Calls fail fast.
    Open,
    /// One probe call is allowed through.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Time the circuit stays open before a probe is allowed, in milliseconds.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

impl BreakerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold (minimum 1).
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the reset timeout.
    #[must_use]
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the reset timeout as a [`Duration`].
    #[must_use]
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Serializable view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Collaborator name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Failures counted since the last success or reset.
    pub failure_count: u32,
    /// Failures needed to open.
    pub threshold: u32,
    /// Reset timeout in milliseconds.
    pub reset_timeout_ms: u64,
    /// Milliseconds since the most recent failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub millis_since_last_failure: Option<u64>,
}

#[derive(Debug, Default)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_granted_at: Option<Instant>,
}

/// Failure-isolation state machine for one logical remote operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    reset_timeout: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker using the system clock.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Creates a closed breaker with an explicit time source.
    #[must_use]
    pub fn with_clock(name: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
            clock,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Returns the collaborator name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether a call may proceed.
    ///
    /// Transitions Open to HalfOpen once the reset timeout has elapsed since
    /// the last failure; exactly one probe is granted per half-open window.
    pub fn can_execute(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map_or(self.reset_timeout, |at| now.saturating_duration_since(at));
                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_granted_at = Some(now);
                    info!(breaker = %self.name, "Circuit half-open, allowing probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                // A probe whose outcome never arrived is considered lost after
                // another reset window.
                let lost = inner
                    .probe_granted_at
                    .map_or(true, |at| now.saturating_duration_since(at) >= self.reset_timeout);
                if lost {
                    inner.probe_granted_at = Some(now);
                }
                lost
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            info!(breaker = %self.name, "Probe succeeded, circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.probe_granted_at = None;
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(now);

        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.threshold => {
                inner.state = CircuitState::Open;
                warn!(
                    breaker = %self.name,
                    failures = inner.failure_count,
                    "Failure threshold reached, circuit opened"
                );
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.probe_granted_at = None;
                warn!(breaker = %self.name, "Probe failed, circuit re-opened");
            }
            _ => {}
        }
    }

    /// Forces the breaker closed and clears its counters.
    pub fn reset(&self) {
        *self.inner.lock() = BreakerInner::default();
    }

    /// Returns the current state without side effects.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns the current failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Returns a serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            threshold: self.threshold,
            reset_timeout_ms: u64::try_from(self.reset_timeout.as_millis()).unwrap_or(u64::MAX),
            millis_since_last_failure: inner.last_failure.map(|at| {
                u64::try_from(now.saturating_duration_since(at).as_millis()).unwrap_or(u64::MAX)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ManualClock;

    fn breaker(threshold: u32, reset_ms: u64) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = BreakerConfig::new()
            .with_failure_threshold(threshold)
            .with_reset_timeout(Duration::from_millis(reset_ms));
        (CircuitBreaker::with_clock("agent", config, clock.clone()), clock)
    }

    #[test]
    fn test_config_defaults() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.reset_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_opens_after_threshold_consecutive_failures() {
        let (breaker, _clock) = breaker(3, 1000);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let (breaker, _clock) = breaker(2, 1000);

        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 1);
    }

    #[test]
    fn test_reset_timeout_boundary_and_probe_failure() {
        let (breaker, clock) = breaker(2, 5000);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_millis(4999));
        assert!(!breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_millis(1));
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.failure_count(), 3);
        // Timer restarted at the probe failure.
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_half_open_allows_single_probe() {
        let (breaker, clock) = breaker(1, 100);

        breaker.record_failure();
        clock.advance(Duration::from_millis(100));

        assert!(breaker.can_execute());
        assert!(!breaker.can_execute());
        assert!(!breaker.can_execute());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_lost_probe_is_regranted_after_reset_window() {
        let (breaker, clock) = breaker(1, 100);

        breaker.record_failure();
        clock.advance(Duration::from_millis(100));
        assert!(breaker.can_execute());
        assert!(!breaker.can_execute());

        clock.advance(Duration::from_millis(100));
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_reset_forces_closed() {
        let (breaker, _clock) = breaker(1, 60_000);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_snapshot() {
        let (breaker, clock) = breaker(2, 1000);
        breaker.record_failure();
        clock.advance(Duration::from_millis(40));

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.name, "agent");
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.threshold, 2);
        assert_eq!(snapshot.millis_since_last_failure, Some(40));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "closed");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(CircuitState::Open.to_string(), "open");
    }
}
