//! Pipeline builder with validation.

use super::executor::PipelineExecutor;
use super::step::Step;
use crate::errors::PipelineValidationError;
use crate::events::EventSink;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated pipelines.
#[derive(Default)]
pub struct PipelineBuilder {
    name: String,
    steps: Vec<Step>,
    finalizer: Option<Step>,
    events: Option<Arc<dyn EventSink>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the terminal step that runs only if every other step succeeded.
    #[must_use]
    pub fn finalizer(mut self, step: Step) -> Self {
        self.finalizer = Some(step);
        self
    }

    /// Publishes lifecycle events to `events`.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validates and builds the executor.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline name is blank, there are no steps, a
    /// step name is blank, or two steps share a name.
    pub fn build(self) -> Result<PipelineExecutor, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            ));
        }
        if self.steps.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no steps",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for step in self.steps.iter().chain(self.finalizer.iter()) {
            if step.name().trim().is_empty() {
                return Err(PipelineValidationError::new(format!(
                    "Pipeline '{}' has a step with an empty name",
                    self.name
                )));
            }
            if !seen.insert(step.name()) {
                return Err(PipelineValidationError::new(format!(
                    "Duplicate step name '{}'",
                    step.name()
                ))
                .with_steps(vec![step.name().to_string()]));
            }
        }

        let executor = PipelineExecutor::new(self.name, self.steps, self.finalizer);
        Ok(match self.events {
            Some(events) => executor.with_events(events),
            None => executor,
        })
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("finalizer", &self.finalizer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallLog, RecordingWork};

    fn step(name: &str) -> Step {
        Step::new(name, RecordingWork::new(name, &CallLog::new()))
    }

    #[test]
    fn test_builds_valid_pipeline() {
        let executor = PipelineBuilder::new("analytics")
            .step(step("dbt-build"))
            .step(step("publish"))
            .finalizer(step("cleanup"))
            .build()
            .unwrap();
        assert_eq!(executor.name(), "analytics");
        assert_eq!(executor.steps().len(), 2);
        assert_eq!(executor.finalizer().map(Step::name), Some("cleanup"));
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(PipelineBuilder::new("  ").step(step("a")).build().is_err());
    }

    #[test]
    fn test_no_steps_rejected() {
        let err = PipelineBuilder::new("p").build().unwrap_err();
        assert!(err.message.contains("no steps"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = PipelineBuilder::new("p")
            .step(step("a"))
            .finalizer(step("a"))
            .build()
            .unwrap_err();
        assert_eq!(err.steps, vec!["a"]);
    }

    #[test]
    fn test_blank_step_name_rejected() {
        assert!(PipelineBuilder::new("p").step(step("")).build().is_err());
    }
}
