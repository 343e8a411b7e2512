//! # Researchflow
//!
//! The resilience and orchestration engine behind a multi-stage research
//! pipeline that calls an external generative-text service.
//!
//! Researchflow provides:
//!
//! - **Failure isolation**: one circuit breaker per remote collaborator
//! - **Bounded fan-out**: order-preserving batch execution with a concurrency cap
//! - **Retrying calls**: per-attempt timeouts, exponential backoff and cancellation
//! - **Budgets**: usage metering, ceilings and cost estimates
//! - **Sequencing**: stages run in order with partial-failure bookkeeping
//! - **Deduplication**: near-duplicate detection over hashed text fingerprints
//! - **Calibration**: confidence adjustment from observed outcomes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use researchflow::prelude::*;
//!
//! let orchestrator = PipelineBuilder::new(agent)
//!     .stage(ideate)
//!     .stage(score)
//!     .with_config(EngineConfig::from_path("engine.json")?)
//!     .build()?;
//!
//! let result = orchestrator.run("low-power keyword spotting").await?;
//! for item in &result.items {
//!     println!("{:?} {}", item.quality_score, item.content);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod budget;
pub mod calibration;
pub mod cancellation;
pub mod circuit;
pub mod concurrency;
pub mod config;
pub mod errors;
pub mod events;
pub mod invoke;
pub mod observability;
pub mod pipeline;
pub mod similarity;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::budget::{BudgetTracker, PricingTable, UsageTotals};
    pub use crate::calibration::{CalibrationConfig, Outcome, OutcomeCalibrator};
    pub use crate::cancellation::CancellationToken;
    pub use crate::circuit::{BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState};
    pub use crate::concurrency::BoundedConcurrencyExecutor;
    pub use crate::config::EngineConfig;
    pub use crate::errors::{ResearchflowError, Result};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::invoke::{
        AgentInvoker, AgentRequest, AgentResponse, RetryPolicy, RetryingInvoker, StageInvoker, Usage,
    };
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::pipeline::{PipelineBuilder, PipelineOrchestrator, RunResult, StageRecord, StageStatus};
    pub use crate::similarity::{DedupConfig, SimilarityDeduplicator};
    pub use crate::stages::{FnStage, ResearchItem, StageInput, StageLogic, StageOutput};
}
