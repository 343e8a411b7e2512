//! Ready-made agents, gateways and stages for pipeline tests.

use std::sync::Arc;

use super::ScriptedAgent;
use crate::budget::BudgetTracker;
use crate::cancellation::CancellationToken;
use crate::circuit::BreakerRegistry;
use crate::invoke::{AgentInvoker, AgentRequest, StageInvoker};
use crate::stages::{FnStage, ResearchItem, StageInput, StageLogic, StageOutput};

/// An agent that echoes every prompt.
#[must_use]
pub fn echo_agent() -> Arc<dyn AgentInvoker> {
    Arc::new(ScriptedAgent::new())
}

/// A gateway with a fresh registry, budget and token.
#[must_use]
pub fn stage_invoker(agent: Arc<dyn AgentInvoker>) -> StageInvoker {
    StageInvoker::new(
        agent,
        Arc::new(BreakerRegistry::new()),
        Arc::new(BudgetTracker::new()),
        Arc::new(CancellationToken::new()),
    )
}

/// `count` items with ids `idea-0..` and quality scores equal to their index.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn items(count: usize) -> Vec<ResearchItem> {
    (0..count)
        .map(|i| ResearchItem::new(format!("idea-{i}"), format!("idea number {i}")).with_quality_score(i as f64))
        .collect()
}

/// A first stage that ignores its input and emits [`items`]`(count)`.
#[must_use]
pub fn seed_stage(name: &str, count: usize) -> Arc<dyn StageLogic> {
    Arc::new(
        FnStage::new(name, move |_input: StageInput, _invoker: StageInvoker| async move {
            Ok(StageOutput::new(items(count)))
        })
        .with_requires_input(false),
    )
}

/// A stage that returns its input unchanged.
#[must_use]
pub fn passthrough_stage(name: &str) -> Arc<dyn StageLogic> {
    Arc::new(FnStage::new(name, |input: StageInput, _invoker: StageInvoker| async move {
        Ok(StageOutput::new(input.items))
    }))
}

/// A stage that sends every input item to `collaborator` and replaces its
/// content with the reply.
#[must_use]
pub fn agent_stage(name: &str, collaborator: &str) -> Arc<dyn StageLogic> {
    let collaborator = collaborator.to_string();
    Arc::new(FnStage::new(name, move |input: StageInput, invoker: StageInvoker| {
        let collaborator = collaborator.clone();
        async move {
            let requests = input
                .items
                .iter()
                .map(|item| AgentRequest::new("Refine the research idea.", item.content.clone()))
                .collect();
            let responses = invoker.call_many(&collaborator, requests).await?;
            let refined = input
                .items
                .into_iter()
                .zip(responses)
                .map(|(item, response)| ResearchItem {
                    content: response.raw_text,
                    ..item
                })
                .collect();
            Ok(StageOutput::new(refined))
        }
    }))
}
