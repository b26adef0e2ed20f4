//! Core domain model types.
//!
//! - Step status and pipeline state enums
//! - Per-step results and payloads
//! - The pipeline run record

mod result;
mod run;
mod status;

pub use result::{StepOutcome, StepPayload, StepResult};
pub use run::{PipelineRun, RunOutcome};
pub use status::{PipelineState, StepStatus};
