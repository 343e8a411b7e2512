//! Usage metering, budget ceilings and cost estimation.

mod pricing;
mod tracker;

pub use pricing::{ModelPrice, PricingTable};
pub use tracker::{BudgetTracker, UsageRecord, UsageTotals};
