//! Cost estimation from usage records.

use super::UsageRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Price of one model, per million units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    /// Price per million prompt units.
    pub input_per_million: f64,
    /// Price per million completion units.
    pub output_per_million: f64,
}

impl ModelPrice {
    /// Creates a price.
    #[must_use]
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Returns the cost of the given units.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cost(&self, input_units: u64, output_units: u64) -> f64 {
        (input_units as f64 * self.input_per_million + output_units as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

impl Default for ModelPrice {
    fn default() -> Self {
        Self::new(3.0, 15.0)
    }
}

/// Model id to price mapping with a fallback for unknown models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    /// Known model prices.
    #[serde(default)]
    pub models: HashMap<String, ModelPrice>,
    /// Price used for models not in the table.
    #[serde(default)]
    pub default_price: ModelPrice,
}

impl PricingTable {
    /// Creates a table containing only the default price.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a model price.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.models.insert(model.into(), price);
        self
    }

    /// Sets the fallback price.
    #[must_use]
    pub fn with_default_price(mut self, price: ModelPrice) -> Self {
        self.default_price = price;
        self
    }

    /// Returns the price that applies to `model`.
    #[must_use]
    pub fn price_for(&self, model: &str) -> ModelPrice {
        self.models.get(model).copied().unwrap_or(self.default_price)
    }

    /// Estimates the cost of a usage log.
    #[must_use]
    pub fn estimate_cost(&self, records: &[UsageRecord]) -> f64 {
        records
            .iter()
            .map(|record| self.price_for(&record.model_id).cost(record.input_units, record.output_units))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(model: &str, input: u64, output: u64) -> UsageRecord {
        UsageRecord {
            collaborator: "c".to_string(),
            model_id: model.to_string(),
            input_units: input,
            output_units: output,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_known_and_fallback_prices() {
        let table = PricingTable::new()
            .with_model("small", ModelPrice::new(1.0, 2.0))
            .with_default_price(ModelPrice::new(10.0, 20.0));

        let cost = table.estimate_cost(&[
            record("small", 1_000_000, 500_000),
            record("unknown", 100_000, 0),
        ]);

        assert!((cost - (1.0 + 1.0 + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_log_costs_nothing() {
        assert!(PricingTable::new().estimate_cost(&[]).abs() < f64::EPSILON);
    }
}
