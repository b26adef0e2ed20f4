//! Step status and pipeline state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step has not started.
    #[default]
    Pending,
    /// Step is running.
    Running,
    /// Step completed successfully.
    Succeeded,
    /// Step failed after its retries.
    Failed,
    /// Step was not run.
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StepStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Where a pipeline run currently stands.
///
/// Moves `Pending -> Running(1) -> Running(2) -> ...` and ends in
/// `Succeeded` or `Failed(i)`. Positions are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing has run yet.
    #[default]
    Pending,
    /// The step at this position is running.
    Running(usize),
    /// Every required step succeeded.
    Succeeded,
    /// The step at this position failed.
    Failed(usize),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running(i) => write!(f, "running({i})"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(i) => write!(f, "failed({i})"),
        }
    }
}

impl PipelineState {
    /// Moves to the next step. Only valid from `Pending` or `Running`.
    #[must_use]
    pub fn advance(self) -> Self {
        match self {
            Self::Pending => Self::Running(1),
            Self::Running(i) => Self::Running(i + 1),
            terminal => terminal,
        }
    }

    /// Records a failure of the running step.
    #[must_use]
    pub fn fail(self) -> Self {
        match self {
            Self::Running(i) => Self::Failed(i),
            other => other,
        }
    }

    /// Returns true once the run has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}
