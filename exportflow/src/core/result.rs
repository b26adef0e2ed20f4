//! Per-step results.

use super::StepStatus;
use crate::errors::{ErrorKind, ExportflowError};
use crate::process::RunResult;
use crate::retention::RetentionReport;
use crate::sql::{ExportAccounting, ScriptReport};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a successful unit of work produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StepPayload {
    /// Nothing worth reporting.
    #[default]
    Empty,
    /// A subprocess exited cleanly.
    Process(RunResult),
    /// Dry-run row counts.
    DryRun(ExportAccounting),
    /// Results of a live script run.
    Statements(ScriptReport),
    /// Outcome of a retention sweep.
    Retention(RetentionReport),
    /// A short free-form summary.
    Message(String),
}

impl StepPayload {
    /// Transcript lines carried by the payload, if any.
    #[must_use]
    pub fn transcript(&self) -> &[String] {
        match self {
            Self::Process(run) => &run.transcript,
            _ => &[],
        }
    }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The work succeeded, possibly after retries.
    Success(StepPayload),
    /// The work failed on its final attempt.
    Failed {
        /// Rendered error of the last attempt.
        error: String,
        /// Classification of that error.
        kind: ErrorKind,
        /// Attempts made.
        attempts: u32,
    },
    /// The step never ran.
    Skipped {
        /// Why it was skipped.
        reason: String,
    },
}

/// Record of one step within a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step name.
    pub name: String,
    /// 1-based position in the pipeline.
    pub position: usize,
    /// How the step ended.
    pub outcome: StepOutcome,
    /// Attempts made (0 when skipped).
    pub attempts: u32,
    /// Output captured from subprocesses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<String>,
    /// Wall-clock time spent, in milliseconds.
    pub duration_ms: u64,
}

impl StepResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        name: impl Into<String>,
        position: usize,
        payload: StepPayload,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        let transcript = payload.transcript().to_vec();
        Self {
            name: name.into(),
            position,
            outcome: StepOutcome::Success(payload),
            attempts,
            transcript,
            duration_ms: millis(duration),
        }
    }

    /// Creates a failed result from the last attempt's error.
    #[must_use]
    pub fn failed(
        name: impl Into<String>,
        position: usize,
        error: &ExportflowError,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            position,
            outcome: StepOutcome::Failed {
                error: error.to_string(),
                kind: error.kind(),
                attempts,
            },
            attempts,
            transcript: error.transcript().map(<[String]>::to_vec).unwrap_or_default(),
            duration_ms: millis(duration),
        }
    }

    /// Creates a skipped result.
    #[must_use]
    pub fn skipped(name: impl Into<String>, position: usize, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position,
            outcome: StepOutcome::Skipped {
                reason: reason.into(),
            },
            attempts: 0,
            transcript: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Returns the terminal status of the step.
    #[must_use]
    pub fn status(&self) -> StepStatus {
        match self.outcome {
            StepOutcome::Success(_) => StepStatus::Succeeded,
            StepOutcome::Failed { .. } => StepStatus::Failed,
            StepOutcome::Skipped { .. } => StepStatus::Skipped,
        }
    }

    /// Returns true if the step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StepOutcome::Success(_))
    }

    /// Returns true if the step failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed { .. })
    }

    /// Returns the payload of a successful step.
    #[must_use]
    pub fn payload(&self) -> Option<&StepPayload> {
        match &self.outcome {
            StepOutcome::Success(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns the wall-clock duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
