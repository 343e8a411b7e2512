//! Retry-with-timeout-and-cancellation wrapper around one remote call.

use super::RetryPolicy;
use crate::cancellation::{cancelled_or_pending, CancellationToken};
use crate::circuit::CircuitBreaker;
use crate::errors::{ResearchflowError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Attempt accounting for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvocationStats {
    /// Attempts actually started (0 when the breaker rejected the call).
    pub attempts: u32,
    /// Wall time spent including backoff sleeps.
    pub elapsed: Duration,
}

/// Wraps a zero-argument async operation with timeout, retries, circuit
/// breaker gating and external cancellation.
///
/// The breaker hears about each invocation exactly once: one success or one
/// failure after all retries, never one report per attempt.
#[derive(Debug, Clone)]
pub struct RetryingInvoker {
    collaborator: String,
    policy: RetryPolicy,
    breaker: Option<Arc<CircuitBreaker>>,
    cancel: Option<Arc<CancellationToken>>,
}

impl RetryingInvoker {
    /// Creates an invoker with no breaker and no cancellation signal.
    #[must_use]
    pub fn new(collaborator: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            collaborator: collaborator.into(),
            policy,
            breaker: None,
            cancel: None,
        }
    }

    /// Attaches a circuit breaker.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Attaches an external cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns the collaborator name.
    #[must_use]
    pub fn collaborator(&self) -> &str {
        &self.collaborator
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `op` until it succeeds, fails permanently, or retries run out.
    pub async fn invoke<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.invoke_with_stats(op).await.0
    }

    /// Like [`RetryingInvoker::invoke`], also returning attempt accounting.
    pub async fn invoke_with_stats<T, F, Fut>(&self, mut op: F) -> (Result<T>, InvocationStats)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();

        if let Some(breaker) = &self.breaker {
            if !breaker.can_execute() {
                debug!(collaborator = %self.collaborator, "Circuit open, failing fast");
                return (
                    Err(ResearchflowError::circuit_open(&self.collaborator)),
                    InvocationStats::default(),
                );
            }
        }

        let cancel = self.cancel.as_deref();
        let timeout = self.policy.attempt_timeout();
        let max_attempts = self.policy.max_attempts();
        let mut attempts = 0_u32;

        let outcome = loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                break Err(self.cancelled_error());
            }

            attempts += 1;
            let result = tokio::select! {
                biased;
                () = cancelled_or_pending(cancel) => Err(self.cancelled_error()),
                timed = tokio::time::timeout(timeout, op()) => timed.unwrap_or_else(|_| {
                    Err(ResearchflowError::timeout(&self.collaborator, self.policy.attempt_timeout_ms))
                }),
            };

            match result {
                Ok(value) => break Ok(value),
                Err(err) if !err.is_retryable() || attempts >= max_attempts => break Err(err),
                Err(err) => {
                    let delay = self.policy.backoff_for(attempts - 1);
                    debug!(
                        collaborator = %self.collaborator,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Retrying after error"
                    );
                    let interrupted = tokio::select! {
                        biased;
                        () = cancelled_or_pending(cancel) => true,
                        () = tokio::time::sleep(delay) => false,
                    };
                    if interrupted {
                        break Err(self.cancelled_error());
                    }
                }
            }
        };

        // Cancellation says nothing about the collaborator's health. An
        // unreported half-open probe is regranted after another reset window.
        if let Some(breaker) = &self.breaker {
            match &outcome {
                Ok(_) => breaker.record_success(),
                Err(ResearchflowError::Cancelled { .. }) => {}
                Err(_) => breaker.record_failure(),
            }
        }

        if let Err(err) = &outcome {
            warn!(
                collaborator = %self.collaborator,
                attempts,
                kind = err.kind(),
                error = %err,
                "Invocation failed"
            );
        }

        let stats = InvocationStats {
            attempts,
            elapsed: start.elapsed(),
        };
        (outcome, stats)
    }

    fn cancelled_error(&self) -> ResearchflowError {
        let reason = self
            .cancel
            .as_ref()
            .and_then(|token| token.reason())
            .unwrap_or_else(|| "cancelled".to_string());
        ResearchflowError::cancelled(format!("{} ({})", reason, self.collaborator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{BreakerConfig, CircuitState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(max_retries)
            .with_base_backoff(Duration::from_millis(100))
            .with_attempt_timeout(Duration::from_secs(1))
    }

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "agent",
            BreakerConfig::new().with_failure_threshold(threshold),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let breaker = breaker(3);
        let invoker = RetryingInvoker::new("agent", fast_policy(2)).with_breaker(breaker.clone());

        let (result, stats) = invoker.invoke_with_stats(|| async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(stats.attempts, 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let breaker = breaker(3);
        breaker.record_failure();
        let invoker = RetryingInvoker::new("agent", fast_policy(2)).with_breaker(breaker.clone());

        let result = invoker
            .invoke(|| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ResearchflowError::transient("agent", "503"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // One success for the whole invocation clears the earlier failure.
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_single_breaker_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let breaker = breaker(3);
        let invoker = RetryingInvoker::new("agent", fast_policy(3)).with_breaker(breaker.clone());

        let (result, stats) = invoker
            .invoke_with_stats(|| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ResearchflowError::transient("agent", format!("attempt {n}")))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ResearchflowError::Transient { ref message, .. } if message == "attempt 3"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(stats.attempts, 4);
        assert_eq!(breaker.failure_count(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_exponential() {
        let invoker = RetryingInvoker::new("agent", fast_policy(2));

        let (result, stats) = invoker
            .invoke_with_stats(|| async { Err::<(), _>(ResearchflowError::transient("agent", "down")) })
            .await;

        assert!(result.is_err());
        // 100ms after the first failure, 200ms after the second, none after the last.
        assert_eq!(stats.elapsed, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_makes_no_call() {
        let calls = AtomicUsize::new(0);
        let breaker = breaker(1);
        breaker.record_failure();
        let invoker = RetryingInvoker::new("agent", fast_policy(5)).with_breaker(breaker.clone());

        let (result, stats) = invoker
            .invoke_with_stats(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(ResearchflowError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stats.attempts, 0);
        assert_eq!(breaker.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let invoker = RetryingInvoker::new("agent", fast_policy(5));

        let result = invoker
            .invoke(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ResearchflowError::validation("not json")) }
            })
            .await;

        assert!(matches!(result, Err(ResearchflowError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried_then_surfaced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let invoker = RetryingInvoker::new(
            "slow",
            fast_policy(1).with_attempt_timeout(Duration::from_millis(250)),
        );

        let result = invoker
            .invoke(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                }
            })
            .await;

        match result {
            Err(ResearchflowError::Timeout { collaborator, timeout_ms }) => {
                assert_eq!(collaborator, "slow");
                assert_eq!(timeout_ms, 250);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_in_flight_attempt() {
        let token = Arc::new(CancellationToken::new());
        let breaker = breaker(3);
        let invoker = RetryingInvoker::new("agent", fast_policy(5).with_attempt_timeout(Duration::from_secs(60)))
            .with_breaker(breaker.clone())
            .with_cancellation(token.clone());

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                token.cancel("user abort");
            })
        };

        let (result, stats) = invoker
            .invoke_with_stats(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        canceller.await.unwrap();

        match result {
            Err(ResearchflowError::Cancelled { reason }) => assert!(reason.contains("user abort")),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(stats.attempts, 1);
        assert!(stats.elapsed < Duration::from_secs(1));
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_fan_out_leaves_breaker_closed() {
        let token = Arc::new(CancellationToken::new());
        let breaker = breaker(2);
        let invoker = RetryingInvoker::new("agent", fast_policy(0).with_attempt_timeout(Duration::from_secs(60)))
            .with_breaker(breaker.clone())
            .with_cancellation(token.clone());

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                token.cancel("shutdown");
            })
        };

        let hang = || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        };
        let (first, second, third) = tokio::join!(invoker.invoke(hang), invoker.invoke(hang), invoker.invoke(hang));
        canceller.await.unwrap();

        for result in [first, second, third] {
            assert!(matches!(result, Err(ResearchflowError::Cancelled { .. })));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff_stops_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = Arc::new(CancellationToken::new());
        let invoker = RetryingInvoker::new(
            "agent",
            fast_policy(5).with_base_backoff(Duration::from_secs(10)),
        )
        .with_cancellation(token.clone());

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                token.cancel("shutdown");
            })
        };

        let result = invoker
            .invoke(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ResearchflowError::transient("agent", "flaky"))
                }
            })
            .await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(ResearchflowError::Cancelled { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_makes_no_call() {
        let token = Arc::new(CancellationToken::new());
        token.cancel("already stopped");
        let calls = AtomicUsize::new(0);
        let invoker = RetryingInvoker::new("agent", fast_policy(2)).with_cancellation(token);

        let result = invoker
            .invoke(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(ResearchflowError::Cancelled { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
