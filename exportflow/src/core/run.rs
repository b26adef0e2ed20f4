//! The record of one pipeline execution.

use super::{StepOutcome, StepResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step succeeded.
    Success,
    /// The named step failed; nothing after it ran except as recorded.
    Failed {
        /// 1-based position of the first failed step.
        step_index: usize,
        /// Name of that step.
        step_name: String,
        /// Its rendered error.
        cause: String,
    },
}

impl RunOutcome {
    /// Returns true for [`RunOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// One execution of a pipeline. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// One entry per step that was reached, in order.
    pub results: Vec<StepResult>,
    /// Overall outcome.
    pub outcome: RunOutcome,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Builds a finished run and derives its outcome from `results`.
    #[must_use]
    pub fn finish(
        run_id: Uuid,
        pipeline: impl Into<String>,
        results: Vec<StepResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let outcome = results
            .iter()
            .find_map(|r| match &r.outcome {
                StepOutcome::Failed { error, .. } => Some(RunOutcome::Failed {
                    step_index: r.position,
                    step_name: r.name.clone(),
                    cause: error.clone(),
                }),
                _ => None,
            })
            .unwrap_or(RunOutcome::Success);

        Self {
            run_id,
            pipeline: pipeline.into(),
            results,
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// 1-based index of the failed step, if any.
    #[must_use]
    pub fn failed_step_index(&self) -> Option<usize> {
        match &self.outcome {
            RunOutcome::Failed { step_index, .. } => Some(*step_index),
            RunOutcome::Success => None,
        }
    }

    /// Looks up a step result by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Names of the steps that actually ran (succeeded or failed).
    #[must_use]
    pub fn executed_steps(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !matches!(r.outcome, StepOutcome::Skipped { .. }))
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepPayload;
    use crate::errors::ExportflowError;
    use std::time::Duration;

    #[test]
    fn test_outcome_names_first_failed_step() {
        let err = ExportflowError::step("boom");
        let results = vec![
            StepResult::success("a", 1, StepPayload::Empty, 1, Duration::ZERO),
            StepResult::failed("b", 2, &err, 1, Duration::ZERO),
            StepResult::skipped("cleanup", 3, "a previous step failed"),
        ];
        let run = PipelineRun::finish(Uuid::new_v4(), "p", results, Utc::now());

        assert!(!run.is_success());
        assert_eq!(run.failed_step_index(), Some(2));
        assert_eq!(run.executed_steps(), vec!["a", "b"]);
        match &run.outcome {
            RunOutcome::Failed { step_name, cause, .. } => {
                assert_eq!(step_name, "b");
                assert!(cause.contains("boom"));
            }
            RunOutcome::Success => panic!("expected failure"),
        }
    }

    #[test]
    fn test_all_success() {
        let results = vec![StepResult::success("a", 1, StepPayload::Empty, 1, Duration::ZERO)];
        let run = PipelineRun::finish(Uuid::new_v4(), "p", results, Utc::now());
        assert!(run.is_success());
        assert!(run.duration() >= chrono::Duration::zero());
        assert!(run.step("a").is_some());
    }

    #[test]
    fn test_run_serializes_to_json() {
        let run = PipelineRun::finish(Uuid::new_v4(), "export", Vec::new(), Utc::now());
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["outcome"]["status"], "success");
        assert_eq!(json["pipeline"], "export");
    }
}
