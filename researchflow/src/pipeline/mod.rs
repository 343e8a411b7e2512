//! Pipeline building and execution.
//!
//! This module provides:
//! - `PipelineBuilder`, which validates the stage list
//! - `PipelineOrchestrator`, which runs stages strictly in sequence
//! - stage records and the final `RunResult`

mod builder;
mod orchestrator;
mod record;
mod result;

pub use builder::PipelineBuilder;
pub use orchestrator::{rank_items, PipelineOrchestrator};
pub use record::{StageHistory, StageRecord, StageStatus};
pub use result::RunResult;
