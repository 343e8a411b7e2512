//! Programmable agent for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::errors::{ResearchflowError, Result};
use crate::invoke::{AgentInvoker, AgentRequest, AgentResponse, Usage};

/// One scripted reaction of a [`ScriptedAgent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Reply with this text.
    Reply(String),
    /// Fail with a retryable error carrying this message.
    Transient(String),
    /// Fail with a non-retryable error carrying this message.
    Invalid(String),
    /// Never answer; the caller's timeout or cancellation must end the call.
    Hang,
}

/// An [`AgentInvoker`] that plays back a script, then echoes prompts.
///
/// Counts calls and tracks the peak number of calls in flight at once.
#[derive(Debug)]
pub struct ScriptedAgent {
    model: String,
    usage: Usage,
    delay: Duration,
    script: Mutex<VecDeque<ScriptStep>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAgent {
    /// Creates an agent that echoes the user prompt.
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: "scripted-model".to_string(),
            usage: Usage::new(10, 5),
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sets the model reported in responses.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the usage reported per response.
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Sets a delay before every reaction.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues a step.
    #[must_use]
    pub fn then(self, step: ScriptStep) -> Self {
        self.script.lock().push_back(step);
        self
    }

    /// Queues a reply.
    #[must_use]
    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.then(ScriptStep::Reply(text.into()))
    }

    /// Queues a retryable failure.
    #[must_use]
    pub fn then_transient(self, message: impl Into<String>) -> Self {
        self.then(ScriptStep::Transient(message.into()))
    }

    /// Returns how many calls were made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the highest number of simultaneous calls observed.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Returns the user prompts received, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

/// Decrements the in-flight counter even when the call future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentInvoker for ScriptedAgent {
    async fn call(&self, request: &AgentRequest, _cancel: &CancellationToken) -> Result<AgentResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.user_prompt.clone());
        let step = self.script.lock().pop_front();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        match step {
            None => Ok(AgentResponse::new(request.user_prompt.clone(), model, self.usage)),
            Some(ScriptStep::Reply(text)) => Ok(AgentResponse::new(text, model, self.usage)),
            Some(ScriptStep::Transient(message)) => Err(ResearchflowError::transient("scripted", message)),
            Some(ScriptStep::Invalid(message)) => Err(ResearchflowError::validation(message)),
            Some(ScriptStep::Hang) => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_echo() {
        let agent = ScriptedAgent::new()
            .then_reply("first")
            .then_transient("flaky");
        let token = CancellationToken::new();

        let first = agent.call(&AgentRequest::new("s", "p1"), &token).await.unwrap();
        assert_eq!(first.raw_text, "first");

        let err = agent.call(&AgentRequest::new("s", "p2"), &token).await.unwrap_err();
        assert!(err.is_retryable());

        let echo = agent.call(&AgentRequest::new("s", "p3"), &token).await.unwrap();
        assert_eq!(echo.raw_text, "p3");
        assert_eq!(echo.model, "scripted-model");

        assert_eq!(agent.call_count(), 3);
        assert_eq!(agent.prompts(), vec!["p1", "p2", "p3"]);
        assert_eq!(agent.peak_concurrency(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_is_dropped_by_timeout() {
        let agent = ScriptedAgent::new().then(ScriptStep::Hang);
        let token = CancellationToken::new();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            agent.call(&AgentRequest::new("s", "p"), &token),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(agent.in_flight.load(Ordering::SeqCst), 0);
    }
}
