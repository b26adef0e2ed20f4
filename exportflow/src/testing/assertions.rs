//! Test assertions for step results and pipeline runs.

use crate::core::{PipelineRun, StepStatus};

/// Asserts that the named step reached `expected`.
pub fn assert_step_status(run: &PipelineRun, step: &str, expected: StepStatus) {
    let result = run
        .step(step)
        .unwrap_or_else(|| panic!("No result for step '{step}' in run '{}'", run.pipeline));
    assert_eq!(
        result.status(),
        expected,
        "Expected step '{}' to be {}, got {:?}",
        step,
        expected,
        result.outcome
    );
}

/// Asserts that the named step succeeded.
pub fn assert_step_succeeded(run: &PipelineRun, step: &str) {
    assert_step_status(run, step, StepStatus::Succeeded);
}

/// Asserts that the named step failed.
pub fn assert_step_failed(run: &PipelineRun, step: &str) {
    assert_step_status(run, step, StepStatus::Failed);
}

/// Asserts that the named step was skipped.
pub fn assert_step_skipped(run: &PipelineRun, step: &str) {
    assert_step_status(run, step, StepStatus::Skipped);
}

/// Asserts that the run succeeded.
pub fn assert_run_succeeded(run: &PipelineRun) {
    assert!(
        run.is_success(),
        "Expected run '{}' to succeed, got {:?}",
        run.pipeline,
        run.outcome
    );
}

/// Asserts that the run failed at the 1-based step `index`.
pub fn assert_run_failed_at(run: &PipelineRun, index: usize) {
    assert_eq!(
        run.failed_step_index(),
        Some(index),
        "Expected run '{}' to fail at step {}, got {:?}",
        run.pipeline,
        index,
        run.outcome
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StepPayload, StepResult};
    use crate::errors::ExportflowError;
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn run() -> PipelineRun {
        let err = ExportflowError::step("boom");
        PipelineRun::finish(
            Uuid::new_v4(),
            "p",
            vec![
                StepResult::success("a", 1, StepPayload::Empty, 1, Duration::ZERO),
                StepResult::failed("b", 2, &err, 1, Duration::ZERO),
                StepResult::skipped("c", 3, "not reached"),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn test_assertions_pass() {
        let run = run();
        assert_step_succeeded(&run, "a");
        assert_step_failed(&run, "b");
        assert_step_skipped(&run, "c");
        assert_run_failed_at(&run, 2);
    }

    #[test]
    #[should_panic(expected = "Expected run 'p' to succeed")]
    fn test_assert_run_succeeded_panics() {
        assert_run_succeeded(&run());
    }

    #[test]
    #[should_panic(expected = "No result for step 'zzz'")]
    fn test_missing_step_panics() {
        assert_step_succeeded(&run(), "zzz");
    }
}
