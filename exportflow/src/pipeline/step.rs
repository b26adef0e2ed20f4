//! Named units of pipeline work.

use super::retry::RetryPolicy;
use crate::core::StepPayload;
use crate::errors::ExportflowError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Something a pipeline step does.
///
/// Implementations must be safe to call again after a failure; the retry
/// policy re-runs the whole unit.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Performs the work once.
    async fn run(&self) -> Result<StepPayload, ExportflowError>;

    /// Short description for logs.
    fn describe(&self) -> String {
        String::from("work")
    }
}

/// A named unit of work with its retry policy.
///
/// Immutable once built.
#[derive(Clone)]
pub struct Step {
    name: String,
    retry: RetryPolicy,
    required: bool,
    work: Arc<dyn UnitOfWork>,
}

impl Step {
    /// Creates a required step that is not retried.
    #[must_use]
    pub fn new(name: impl Into<String>, work: impl UnitOfWork + 'static) -> Self {
        Self::from_arc(name, Arc::new(work))
    }

    /// Creates a step around shared work.
    #[must_use]
    pub fn from_arc(name: impl Into<String>, work: Arc<dyn UnitOfWork>) -> Self {
        Self {
            name: name.into(),
            retry: RetryPolicy::none(),
            required: true,
            work,
        }
    }

    /// Allows `retries` immediate re-runs of retryable failures.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry.retries = retries;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Lets the pipeline continue past a failure of this step.
    ///
    /// The failure still counts: the run is reported failed and the
    /// finalizer is skipped.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// The step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Whether a failure stops the pipeline.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// The work performed.
    #[must_use]
    pub fn work(&self) -> &dyn UnitOfWork {
        self.work.as_ref()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("required", &self.required)
            .field("work", &self.work.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl UnitOfWork for Noop {
        async fn run(&self) -> Result<StepPayload, ExportflowError> {
            Ok(StepPayload::Empty)
        }
    }

    #[test]
    fn test_step_defaults() {
        let step = Step::new("dbt-build", Noop);
        assert_eq!(step.name(), "dbt-build");
        assert!(step.is_required());
        assert_eq!(step.retry().retries, 0);
        assert!(format!("{step:?}").contains("dbt-build"));
    }

    #[test]
    fn test_step_builders() {
        let step = Step::new("publish", Noop).with_retries(2).optional();
        assert_eq!(step.retry().max_attempts(), 3);
        assert!(!step.is_required());
    }

    #[tokio::test]
    async fn test_work_runs() {
        let step = Step::new("noop", Noop);
        assert_eq!(step.work().run().await.unwrap(), StepPayload::Empty);
        assert_eq!(step.work().describe(), "work");
    }
}
