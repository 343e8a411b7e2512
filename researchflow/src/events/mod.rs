//! Pipeline lifecycle events.
//!
//! The orchestrator reports every stage transition to an [`EventSink`]
//! passed in at build time. Event type names live in [`event_types`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the orchestrator.
pub mod event_types {
    /// A stage is about to run.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage finished and produced items.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage was skipped or stopped early; downstream stages are skipped.
    pub const STAGE_PARTIAL: &str = "stage.partial";
    /// A stage failed and the run aborted.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// The run finished, whatever its outcome.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
}
