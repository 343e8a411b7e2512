//! Shared call path used by stages to reach the generative collaborator.

use super::{AgentInvoker, AgentRequest, AgentResponse, RetryPolicy, RetryingInvoker};
use crate::budget::BudgetTracker;
use crate::cancellation::CancellationToken;
use crate::circuit::BreakerRegistry;
use crate::concurrency::BoundedConcurrencyExecutor;
use crate::errors::Result;
use std::sync::Arc;
use tracing::debug;

/// Bundles the agent with the run's breakers, budget and cancellation.
///
/// Every call goes through a [`RetryingInvoker`] bound to the
/// collaborator's breaker, and successful responses are metered into the
/// shared [`BudgetTracker`].
#[derive(Clone)]
pub struct StageInvoker {
    agent: Arc<dyn AgentInvoker>,
    registry: Arc<BreakerRegistry>,
    budget: Arc<BudgetTracker>,
    cancel: Arc<CancellationToken>,
    policy: RetryPolicy,
    concurrency: usize,
    default_model: Option<String>,
}

impl StageInvoker {
    /// Creates a gateway with the default retry policy and concurrency.
    #[must_use]
    pub fn new(
        agent: Arc<dyn AgentInvoker>,
        registry: Arc<BreakerRegistry>,
        budget: Arc<BudgetTracker>,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        Self {
            agent,
            registry,
            budget,
            cancel,
            policy: RetryPolicy::default(),
            concurrency: BoundedConcurrencyExecutor::default().limit(),
            default_model: None,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the fan-out limit for [`call_many`](Self::call_many).
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Sets the model used when a request names none.
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Sends one request on behalf of `collaborator`.
    pub async fn call(&self, collaborator: &str, request: AgentRequest) -> Result<AgentResponse> {
        let request = match (&request.model, &self.default_model) {
            (None, Some(model)) => request.with_model(model.clone()),
            _ => request,
        };

        let invoker = RetryingInvoker::new(collaborator, self.policy.clone())
            .with_breaker(self.registry.get_breaker(collaborator))
            .with_cancellation(Arc::clone(&self.cancel));

        let agent = &self.agent;
        let cancel = self.cancel.as_ref();
        let request = &request;
        let response = invoker.invoke(move || agent.call(request, cancel)).await?;

        debug!(
            collaborator,
            model = %response.model,
            units = response.usage.total(),
            "Collaborator call completed"
        );
        self.budget.record_usage(collaborator, &response.model, response.usage);
        Ok(response)
    }

    /// Sends a batch of requests with bounded fan-out, preserving order.
    pub async fn call_many(&self, collaborator: &str, requests: Vec<AgentRequest>) -> Result<Vec<AgentResponse>> {
        BoundedConcurrencyExecutor::new(self.concurrency)
            .map(requests, move |request| self.call(collaborator, request))
            .await
    }

    /// Returns the shared budget tracker.
    #[must_use]
    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    /// Returns the shared breaker registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    /// Returns the run's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }
}

impl std::fmt::Debug for StageInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageInvoker")
            .field("policy", &self.policy)
            .field("concurrency", &self.concurrency)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}
