use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Measures the wall time of a named span.
///
/// Uses the tokio clock so paused-time tests observe virtual durations.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the elapsed time in whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns its duration in milliseconds.
    pub fn finish(self) -> u64 {
        let elapsed_ms = self.elapsed_ms();
        debug!(span = %self.name, elapsed_ms, "Span finished");
        elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_span_timer_uses_tokio_clock() {
        let timer = SpanTimer::start("ideate");
        assert_eq!(timer.name(), "ideate");

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(timer.finish(), 250);
    }
}
