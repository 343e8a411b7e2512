//! Pipeline builder with validation.

use super::PipelineOrchestrator;
use crate::circuit::BreakerRegistry;
use crate::config::EngineConfig;
use crate::errors::{ResearchflowError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::invoke::AgentInvoker;
use crate::stages::StageLogic;
use std::collections::HashSet;
use std::sync::Arc;

/// Assembles a validated [`PipelineOrchestrator`].
///
/// Stages run in the order they are added. Without an explicit registry the
/// orchestrator gets a fresh one built from the config's breaker defaults.
pub struct PipelineBuilder {
    agent: Arc<dyn AgentInvoker>,
    stages: Vec<Arc<dyn StageLogic>>,
    config: EngineConfig,
    registry: Option<Arc<BreakerRegistry>>,
    events: Arc<dyn EventSink>,
}

impl PipelineBuilder {
    /// Creates a builder for pipelines calling `agent`.
    #[must_use]
    pub fn new(agent: Arc<dyn AgentInvoker>) -> Self {
        Self {
            agent,
            stages: Vec::new(),
            config: EngineConfig::default(),
            registry: None,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn StageLogic>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a stage by value.
    #[must_use]
    pub fn with_stage(self, stage: impl StageLogic + 'static) -> Self {
        self.stage(Arc::new(stage))
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing breaker registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<BreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }


    /// Validates the stage list and config and builds the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for an empty pipeline or for empty or
    /// duplicate stage names, and a `Config` error for an invalid config.
    pub fn build(self) -> Result<PipelineOrchestrator> {
        if self.stages.is_empty() {
            return Err(ResearchflowError::validation("pipeline must have at least one stage"));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            let name = stage.name();
            if name.trim().is_empty() {
                return Err(ResearchflowError::validation("stage names must not be empty"));
            }
            if !seen.insert(name) {
                return Err(ResearchflowError::validation(format!("duplicate stage name '{name}'")));
            }
        }

        self.config.validate()?;

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(BreakerRegistry::with_config(self.config.breaker)));

        Ok(PipelineOrchestrator::new(
            self.stages,
            self.agent,
            registry,
            self.events,
            self.config,
        ))
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("stages", &self.stages)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
