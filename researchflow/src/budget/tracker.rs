//! Usage accounting and budget enforcement.

use crate::errors::{ResearchflowError, Result};
use crate::invoke::Usage;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One metered remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Collaborator that made the call.
    pub collaborator: String,
    /// Model that served the call.
    pub model_id: String,
    /// Prompt units.
    pub input_units: u64,
    /// Completion units.
    pub output_units: u64,
    /// When the usage was recorded.
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    /// Returns input plus output units.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.input_units.saturating_add(self.output_units)
    }
}

/// Aggregated usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Number of recorded calls.
    pub calls: usize,
    /// Sum of prompt units.
    pub input_units: u64,
    /// Sum of completion units.
    pub output_units: u64,
    /// Sum of all units.
    pub total_units: u64,
    /// Total units per collaborator.
    pub by_collaborator: BTreeMap<String, u64>,
    /// Total units per model.
    pub by_model: BTreeMap<String, u64>,
}

/// Append-only usage log for one pipeline run.
#[derive(Debug, Default)]
pub struct BudgetTracker {
    records: RwLock<Vec<UsageRecord>>,
}

impl BudgetTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a usage record.
    pub fn record_usage(&self, collaborator: &str, model: &str, usage: Usage) {
        debug!(
            collaborator,
            model,
            input_units = usage.input_units,
            output_units = usage.output_units,
            "Recording usage"
        );
        self.records.write().push(UsageRecord {
            collaborator: collaborator.to_string(),
            model_id: model.to_string(),
            input_units: usage.input_units,
            output_units: usage.output_units,
            timestamp: Utc::now(),
        });
    }

    /// Aggregates overall, per-collaborator and per-model sums.
    #[must_use]
    pub fn totals(&self) -> UsageTotals {
        let records = self.records.read();
        let mut totals = UsageTotals {
            calls: records.len(),
            ..UsageTotals::default()
        };

        for record in records.iter() {
            let units = record.total_units();
            totals.input_units = totals.input_units.saturating_add(record.input_units);
            totals.output_units = totals.output_units.saturating_add(record.output_units);
            totals.total_units = totals.total_units.saturating_add(units);
            let by_collaborator = totals.by_collaborator.entry(record.collaborator.clone()).or_default();
            *by_collaborator = by_collaborator.saturating_add(units);
            let by_model = totals.by_model.entry(record.model_id.clone()).or_default();
            *by_model = by_model.saturating_add(units);
        }

        totals
    }

    /// Returns the total units spent so far.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.records
            .read()
            .iter()
            .fold(0_u64, |acc, record| acc.saturating_add(record.total_units()))
    }

    /// Returns a copy of the usage log.
    #[must_use]
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.read().clone()
    }

    /// Fails when accumulated usage already exceeds `ceiling`.
    ///
    /// Reaching the ceiling exactly is still within budget. `None` disables
    /// the check.
    pub fn check_budget(&self, ceiling: Option<u64>) -> Result<()> {
        let Some(ceiling) = ceiling else {
            return Ok(());
        };
        let spent = self.total_units();
        if spent > ceiling {
            warn!(spent, ceiling, "Budget exceeded");
            return Err(ResearchflowError::BudgetExceeded { spent, ceiling });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_totals_aggregate_by_collaborator_and_model() {
        let tracker = BudgetTracker::new();
        tracker.record_usage("ideator", "model-a", Usage::new(100, 50));
        tracker.record_usage("critic", "model-a", Usage::new(10, 5));
        tracker.record_usage("ideator", "model-b", Usage::new(1, 1));

        let totals = tracker.totals();
        assert_eq!(totals.calls, 3);
        assert_eq!(totals.input_units, 111);
        assert_eq!(totals.output_units, 56);
        assert_eq!(totals.total_units, 167);
        assert_eq!(totals.by_collaborator.get("ideator"), Some(&152));
        assert_eq!(totals.by_collaborator.get("critic"), Some(&15));
        assert_eq!(totals.by_model.get("model-a"), Some(&165));
        assert_eq!(totals.by_model.get("model-b"), Some(&2));
    }

    #[test]
    fn test_totals_saturate_per_collaborator_and_model() {
        let tracker = BudgetTracker::new();
        tracker.record_usage("ideator", "model-a", Usage::new(u64::MAX, 0));
        tracker.record_usage("ideator", "model-a", Usage::new(5, 5));

        let totals = tracker.totals();
        assert_eq!(totals.total_units, u64::MAX);
        assert_eq!(totals.by_collaborator.get("ideator"), Some(&u64::MAX));
        assert_eq!(totals.by_model.get("model-a"), Some(&u64::MAX));
    }

    #[test]
    fn test_empty_totals() {
        assert_eq!(BudgetTracker::new().totals(), UsageTotals::default());
    }

    #[test]
    fn test_check_budget_only_fails_strictly_above_ceiling() {
        let tracker = BudgetTracker::new();
        tracker.record_usage("a", "m", Usage::new(60, 40));

        assert_ok!(tracker.check_budget(None));
        assert_ok!(tracker.check_budget(Some(100)));
        assert_err!(tracker.check_budget(Some(0)));

        match tracker.check_budget(Some(99)) {
            Err(ResearchflowError::BudgetExceeded { spent, ceiling }) => {
                assert_eq!(spent, 100);
                assert_eq!(ceiling, 99);
            }
            other => panic!("expected budget error, got {other:?}"),
        }
    }

    #[test]
    fn test_records_are_append_only_copies() {
        let tracker = BudgetTracker::new();
        tracker.record_usage("a", "m", Usage::new(1, 2));
        let mut copy = tracker.records();
        copy.clear();

        assert_eq!(tracker.records().len(), 1);
        assert_eq!(tracker.records()[0].total_units(), 3);
    }
}
