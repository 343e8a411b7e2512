//! Stage input and output envelopes.

use super::ResearchItem;
use uuid::Uuid;

/// What a stage receives from the orchestrator.
#[derive(Debug, Clone)]
pub struct StageInput {
    /// Identifier of the current run.
    pub run_id: Uuid,
    /// The research query.
    pub query: String,
    /// Name of the stage being run.
    pub stage_name: String,
    /// Zero-based position in the pipeline.
    pub stage_index: usize,
    /// Items produced by the previous stage; empty for the first stage.
    pub items: Vec<ResearchItem>,
}

impl StageInput {
    /// Returns true for the first stage of the pipeline.
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.stage_index == 0
    }
}

/// What a stage hands back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    /// Items for the next stage.
    pub items: Vec<ResearchItem>,
    /// Set when the stage stopped early; downstream stages are skipped.
    pub partial_reason: Option<String>,
    /// Non-fatal notes surfaced in the run result.
    pub warnings: Vec<String>,
}

impl StageOutput {
    /// Creates a complete output.
    #[must_use]
    pub fn new(items: Vec<ResearchItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Creates a complete output with no items.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a partial output that stops the pipeline after this stage.
    #[must_use]
    pub fn partial(reason: impl Into<String>) -> Self {
        Self {
            partial_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Attaches items, e.g. what a partial stage managed to produce.
    #[must_use]
    pub fn with_items(mut self, items: Vec<ResearchItem>) -> Self {
        self.items = items;
        self
    }

    /// Adds a warning.
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Returns true if the stage stopped early.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.partial_reason.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_output() {
        let output = StageOutput::partial("no feasible ideas")
            .with_items(vec![ResearchItem::new("a", "x")])
            .with_warning("scorer degraded");

        assert!(output.is_partial());
        assert_eq!(output.items.len(), 1);
        assert_eq!(output.warnings, vec!["scorer degraded"]);
        assert!(!StageOutput::empty().is_partial());
    }
}
