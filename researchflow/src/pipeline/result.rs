use super::{StageHistory, StageRecord, StageStatus};
use crate::budget::UsageTotals;
use crate::circuit::CircuitState;
use crate::errors::Result;
use crate::stages::ResearchItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// The research query.
    pub query: String,
    /// Surviving items, ranked by quality score.
    pub items: Vec<ResearchItem>,
    /// One record per stage that was attempted or skipped.
    pub stage_history: StageHistory,
    /// Number of stages in the pipeline.
    pub planned_stages: usize,
    /// Usage metered during the run.
    pub usage_totals: UsageTotals,
    /// Estimated cost of the metered usage.
    pub cost_estimate: f64,
    /// Non-fatal problems, in the order they happened.
    pub warnings: Vec<String>,
    /// Breaker states at the end of the run.
    pub breaker_status: BTreeMap<String, CircuitState>,
    /// Wall time of the whole run.
    pub duration_ms: u64,
}

impl RunResult {
    /// Returns true if every planned stage succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stage_history.len() == self.planned_stages
            && self.stage_history.iter().all(|record| record.status == StageStatus::Success)
    }

    /// Returns the first stage that did not succeed.
    #[must_use]
    pub fn first_incomplete_stage(&self) -> Option<&StageRecord> {
        self.stage_history.iter().find(|record| record.status != StageStatus::Success)
    }

    /// Serializes the result as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
