//! Sequential, fail-fast pipeline execution.

use super::step::Step;
use crate::core::{PipelineRun, PipelineState, StepResult};
use crate::events::{names, EventSink, NoOpEventSink};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

const SKIPPED_AFTER_FAILURE: &str = "a previous step failed";

/// Runs steps one at a time, in declared order.
///
/// A failed required step stops the run; later steps are recorded as
/// skipped. The optional finalizer runs only when every earlier step
/// succeeded.
pub struct PipelineExecutor {
    name: String,
    steps: Vec<Step>,
    finalizer: Option<Step>,
    events: Arc<dyn EventSink>,
}

impl PipelineExecutor {
    /// Creates an executor. Prefer [`PipelineBuilder`](super::PipelineBuilder),
    /// which validates step names.
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<Step>, finalizer: Option<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
            finalizer,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Publishes lifecycle events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordinary steps.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The finalizer, if any.
    #[must_use]
    pub fn finalizer(&self) -> Option<&Step> {
        self.finalizer.as_ref()
    }

    /// Executes the pipeline once.
    pub async fn run(&self) -> PipelineRun {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let total = self.steps.len() + usize::from(self.finalizer.is_some());

        info!(pipeline = %self.name, %run_id, steps = total, "Pipeline started");
        self.events
            .emit(
                names::PIPELINE_STARTED,
                Some(json!({"pipeline": self.name, "run_id": run_id, "steps": total})),
            )
            .await;

        let mut state = PipelineState::Pending;
        let mut all_succeeded = true;
        let mut stopped = false;
        let mut results = Vec::with_capacity(total);

        for (i, step) in self.steps.iter().enumerate() {
            let position = i + 1;
            if stopped {
                results.push(self.skip(step, position, SKIPPED_AFTER_FAILURE).await);
                continue;
            }

            state = state.advance();
            let result = self.run_step(step, position).await;
            if result.is_failure() {
                if all_succeeded {
                    state = state.fail();
                }
                all_succeeded = false;
                stopped = step.is_required();
            }
            results.push(result);
        }

        if let Some(finalizer) = &self.finalizer {
            let position = self.steps.len() + 1;
            if all_succeeded {
                state = state.advance();
                let result = self.run_step(finalizer, position).await;
                if result.is_failure() {
                    state = state.fail();
                }
                results.push(result);
            } else {
                results.push(self.skip(finalizer, position, SKIPPED_AFTER_FAILURE).await);
            }
        }

        if !state.is_terminal() {
            state = PipelineState::Succeeded;
        }

        let run = PipelineRun::finish(run_id, self.name.clone(), results, started_at);
        let elapsed_ms = run.duration().num_milliseconds();
        if run.is_success() {
            info!(pipeline = %self.name, %run_id, %state, elapsed_ms, "Pipeline completed");
        } else {
            error!(pipeline = %self.name, %run_id, %state, elapsed_ms, "Pipeline failed");
        }
        self.events
            .emit(
                names::PIPELINE_COMPLETED,
                Some(json!({
                    "pipeline": self.name,
                    "run_id": run_id,
                    "state": state,
                    "outcome": run.outcome,
                })),
            )
            .await;
        run
    }

    async fn run_step(&self, step: &Step, position: usize) -> StepResult {
        let name = step.name();
        info!(step = %name, position, max_attempts = step.retry().max_attempts(), "Starting step");
        self.events
            .emit(
                names::STEP_STARTED,
                Some(json!({"step": name, "position": position})),
            )
            .await;

        let start = Instant::now();
        let events = Arc::clone(&self.events);
        let attempted = step
            .retry()
            .run_observed(
                name,
                || step.work().run(),
                |notice| {
                    events.try_emit(
                        names::STEP_RETRYING,
                        Some(json!({
                            "step": name,
                            "attempt": notice.attempt,
                            "max_attempts": notice.max_attempts,
                            "error": notice.error.to_string(),
                        })),
                    );
                },
            )
            .await;
        let elapsed = start.elapsed();

        match attempted.result {
            Ok(payload) => {
                info!(
                    step = %name,
                    attempts = attempted.attempts,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Step completed"
                );
                self.events
                    .emit(
                        names::STEP_COMPLETED,
                        Some(json!({"step": name, "position": position, "attempts": attempted.attempts})),
                    )
                    .await;
                StepResult::success(name, position, payload, attempted.attempts, elapsed)
            }
            Err(err) => {
                error!(
                    step = %name,
                    position,
                    attempts = attempted.attempts,
                    kind = %err.kind(),
                    error = %err,
                    "Step failed"
                );
                self.events
                    .emit(
                        names::STEP_FAILED,
                        Some(json!({
                            "step": name,
                            "position": position,
                            "attempts": attempted.attempts,
                            "kind": err.kind(),
                            "error": err.to_string(),
                        })),
                    )
                    .await;
                StepResult::failed(name, position, &err, attempted.attempts, elapsed)
            }
        }
    }

    async fn skip(&self, step: &Step, position: usize, reason: &str) -> StepResult {
        info!(step = %step.name(), position, reason, "Skipping step");
        self.events
            .emit(
                names::STEP_SKIPPED,
                Some(json!({"step": step.name(), "position": position, "reason": reason})),
            )
            .await;
        StepResult::skipped(step.name(), position, reason)
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("finalizer", &self.finalizer)
            .finish_non_exhaustive()
    }
}
