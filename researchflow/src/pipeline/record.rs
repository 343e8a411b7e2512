//! Per-stage bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed.
    Success,
    /// Stage was skipped or stopped early; downstream stages did not run.
    Partial,
    /// Stage failed and the run aborted.
    Error,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Final status.
    pub status: StageStatus,
    /// Wall time spent in the stage.
    pub duration_ms: u64,
    /// Reason for a partial or error status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error label, see [`ResearchflowError::kind`](crate::errors::ResearchflowError::kind).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// Number of items the stage produced.
    pub item_count: usize,
}

impl StageRecord {
    /// Creates a success record.
    #[must_use]
    pub fn success(name: impl Into<String>, started_at: DateTime<Utc>, duration_ms: u64, item_count: usize) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Success,
            duration_ms,
            message: None,
            error_kind: None,
            started_at,
            item_count,
        }
    }

    /// Creates a partial record.
    #[must_use]
    pub fn partial(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status: StageStatus::Partial,
            message: Some(reason.into()),
            ..Self::success(name, started_at, duration_ms, 0)
        }
    }

    /// Creates an error record.
    #[must_use]
    pub fn error(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: StageStatus::Error,
            message: Some(message.into()),
            error_kind: Some(kind.into()),
            ..Self::success(name, started_at, duration_ms, 0)
        }
    }

    /// Sets the produced item count.
    #[must_use]
    pub fn with_item_count(mut self, item_count: usize) -> Self {
        self.item_count = item_count;
        self
    }
}

/// Ordered, append-only list of stage records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageHistory {
    records: Vec<StageRecord>,
}

impl StageHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: StageRecord) {
        self.records.push(record);
    }

    /// Returns the records in execution order.
    #[must_use]
    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    /// Iterates over the records.
    pub fn iter(&self) -> impl Iterator<Item = &StageRecord> {
        self.records.iter()
    }

    /// Returns the record for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StageRecord> {
        self.records.iter().find(|record| record.name == name)
    }

    /// Returns the last record.
    #[must_use]
    pub fn last(&self) -> Option<&StageRecord> {
        self.records.last()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no stage has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the statuses in order.
    #[must_use]
    pub fn statuses(&self) -> Vec<StageStatus> {
        self.records.iter().map(|record| record.status).collect()
    }
}
