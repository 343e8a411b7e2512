//! Greedy bounded-concurrency mapper.

use crate::errors::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tracing::debug;

/// Runs an async mapping function over items with at most `limit` in flight.
///
/// Output order matches input order regardless of completion order. A slot
/// freed by any completion is refilled immediately (greedy scheduling, not
/// fixed batches).
#[derive(Debug, Clone, Copy)]
pub struct BoundedConcurrencyExecutor {
    limit: usize,
}

impl BoundedConcurrencyExecutor {
    /// Creates an executor; a limit of zero is treated as one.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Maps every item through `f`.
    ///
    /// After the first failure no further items are launched; items already
    /// in flight run to completion and then that first error is returned.
    pub async fn map<T, R, F, Fut>(&self, items: Vec<T>, mut f: F) -> Result<Vec<R>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut pending = items.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();
        let mut first_error = None;

        for (index, item) in pending.by_ref().take(self.limit) {
            in_flight.push(indexed(index, f(item)));
        }

        while let Some((index, outcome)) = in_flight.next().await {
            match outcome {
                Ok(value) => slots[index] = Some(value),
                Err(err) => {
                    if first_error.is_none() {
                        debug!(index, error = %err, "Item failed, draining in-flight work");
                        first_error = Some(err);
                    }
                }
            }

            if first_error.is_none() {
                if let Some((next_index, item)) = pending.next() {
                    in_flight.push(indexed(next_index, f(item)));
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

async fn indexed<R, Fut>(index: usize, fut: Fut) -> (usize, Result<R>)
where
    Fut: Future<Output = Result<R>>,
{
    (index, fut.await)
}

impl Default for BoundedConcurrencyExecutor {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResearchflowError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_preserves_order_with_variable_delays() {
        let executor = BoundedConcurrencyExecutor::new(2);
        let delays = [50_u64, 10, 40, 5, 20];

        let result = executor
            .map(vec![1_u64, 2, 3, 4, 5], |value| async move {
                let delay = delays[usize::try_from(value - 1).unwrap()];
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(value * 2)
            })
            .await
            .unwrap();

        assert_eq!(result, vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn test_empty_input_never_invokes() {
        let calls = AtomicUsize::new(0);
        let executor = BoundedConcurrencyExecutor::new(3);

        let result: Vec<u32> = executor
            .map(Vec::<u32>::new(), |value| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(value) }
            })
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let executor = BoundedConcurrencyExecutor::new(3);

        let result = executor
            .map((0..12_u64).collect(), |value| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5 + (value % 4) * 7)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(value)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, (0..12).collect::<Vec<_>>());
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_above_item_count_runs_everything_at_once() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let executor = BoundedConcurrencyExecutor::new(100);

        executor
            .map(vec![1, 2, 3, 4], |value| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(value)
                }
            })
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_greedy_refill() {
        // One slow item must not hold back the rest of the batch.
        let executor = BoundedConcurrencyExecutor::new(2);
        let start = tokio::time::Instant::now();

        executor
            .map(vec![100_u64, 10, 10, 10, 10], |delay| async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(delay)
            })
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_error_returned_after_in_flight_settles() {
        let completed = Arc::new(AtomicUsize::new(0));
        let launched = Arc::new(AtomicUsize::new(0));
        let executor = BoundedConcurrencyExecutor::new(2);

        let result: Result<Vec<u64>> = executor
            .map(vec![1_u64, 2, 3, 4, 5], |value| {
                let completed = completed.clone();
                launched.fetch_add(1, Ordering::SeqCst);
                async move {
                    if value == 1 {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        return Err(ResearchflowError::transient("worker", "first"));
                    }
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(value)
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ResearchflowError::Transient { ref message, .. } if message == "first"));
        // Item 2 was already running and was allowed to finish.
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(launched.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_limit_clamped() {
        assert_eq!(BoundedConcurrencyExecutor::new(0).limit(), 1);
    }
}
