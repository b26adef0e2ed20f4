//! Pipeline lifecycle events.
//!
//! The executor publishes one event per transition through an [`EventSink`].
//! Event types are the constants in [`names`].

mod sink;

pub use sink::{EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names.
pub mod names {
    /// A run began.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A run ended, successfully or not.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A step began its first attempt.
    pub const STEP_STARTED: &str = "step.started";
    /// A step succeeded.
    pub const STEP_COMPLETED: &str = "step.completed";
    /// A step failed after its last attempt.
    pub const STEP_FAILED: &str = "step.failed";
    /// A step attempt failed and will be retried.
    pub const STEP_RETRYING: &str = "step.retrying";
    /// A step was not run.
    pub const STEP_SKIPPED: &str = "step.skipped";
}
