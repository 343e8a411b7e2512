//! Engine configuration.

use crate::budget::PricingTable;
use crate::calibration::CalibrationConfig;
use crate::circuit::BreakerConfig;
use crate::errors::{ResearchflowError, Result};
use crate::invoke::RetryPolicy;
use crate::similarity::DedupConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Every tunable of the engine. All fields are optional in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Defaults for newly created circuit breakers.
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Retry policy for every collaborator call.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Fan-out limit for batched calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Maximum total usage units per run; `None` is unlimited.
    #[serde(default)]
    pub budget_ceiling: Option<u64>,
    /// Near-duplicate detection settings.
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Calibration thresholds.
    #[serde(default)]
    pub calibration: CalibrationConfig,
    /// Model prices for cost estimates.
    #[serde(default)]
    pub pricing: PricingTable,
}

fn default_concurrency() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            retry: RetryPolicy::default(),
            concurrency: default_concurrency(),
            budget_ceiling: None,
            dedup: DedupConfig::default(),
            calibration: CalibrationConfig::default(),
            pricing: PricingTable::default(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading engine config");
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ResearchflowError::Config("concurrency must be at least 1".to_string()));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ResearchflowError::Config(
                "breaker failure_threshold must be at least 1".to_string(),
            ));
        }
        self.dedup.validate()?;
        self.calibration.validate()
    }

    /// Sets breaker defaults.
    #[must_use]
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the fan-out limit.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the per-run usage ceiling.
    #[must_use]
    pub fn with_budget_ceiling(mut self, ceiling: u64) -> Self {
        self.budget_ceiling = Some(ceiling);
        self
    }

    /// Sets deduplication settings.
    #[must_use]
    pub fn with_dedup(mut self, dedup: DedupConfig) -> Self {
        self.dedup = dedup;
        self
    }

    /// Sets calibration settings.
    #[must_use]
    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    /// Sets the pricing table.
    #[must_use]
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }
}
