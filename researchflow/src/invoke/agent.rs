//! The generative-text collaborator capability.

use crate::cancellation::CancellationToken;
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Usage units reported by one remote call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Units consumed by the prompt.
    pub input_units: u64,
    /// Units produced by the completion.
    pub output_units: u64,
}

impl Usage {
    /// Creates a usage record.
    #[must_use]
    pub fn new(input_units: u64, output_units: u64) -> Self {
        Self {
            input_units,
            output_units,
        }
    }

    /// Returns input plus output units.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_units.saturating_add(self.output_units)
    }
}

/// A prompt pair sent to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// System prompt.
    pub system_prompt: String,
    /// User prompt.
    pub user_prompt: String,
    /// Model override; `None` lets the agent choose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: None,
        }
    }

    /// Sets the model override.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// The agent's reply. `raw_text` is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Raw generated text.
    pub raw_text: String,
    /// Model that produced the text.
    pub model: String,
    /// Units consumed.
    pub usage: Usage,
}

impl AgentResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(raw_text: impl Into<String>, model: impl Into<String>, usage: Usage) -> Self {
        Self {
            raw_text: raw_text.into(),
            model: model.into(),
            usage,
        }
    }
}

/// Capability for calling the external generative-text service.
///
/// Implementations should map retryable transport problems to
/// [`ResearchflowError::Transient`](crate::errors::ResearchflowError::Transient)
/// and may observe `cancel` to stop early; the engine also drops the call
/// future on timeout or cancellation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Sends one request.
    async fn call(&self, request: &AgentRequest, cancel: &CancellationToken) -> Result<AgentResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total_saturates() {
        assert_eq!(Usage::new(10, 32).total(), 42);
        assert_eq!(Usage::new(u64::MAX, 1).total(), u64::MAX);
    }

    #[test]
    fn test_request_serialization_skips_missing_model() {
        let json = serde_json::to_value(AgentRequest::new("sys", "user")).unwrap();
        assert!(json.get("model").is_none());

        let json = serde_json::to_value(AgentRequest::new("sys", "user").with_model("m-1")).unwrap();
        assert_eq!(json["model"], "m-1");
    }

    #[tokio::test]
    async fn test_mock_agent() {
        let mut agent = MockAgentInvoker::new();
        agent
            .expect_call()
            .times(1)
            .returning(|req, _| Ok(AgentResponse::new(req.user_prompt.to_uppercase(), "mock", Usage::new(1, 1))));

        let token = CancellationToken::new();
        let response = agent.call(&AgentRequest::new("s", "hello"), &token).await.unwrap();
        assert_eq!(response.raw_text, "HELLO");
    }
}
