//! Units of work for testing pipelines.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::core::StepPayload;
use crate::errors::{ConnectionError, ExportflowError, ProcessExecutionError};
use crate::pipeline::UnitOfWork;

/// Shared, ordered log of which work ran. Clone it into several works to
/// observe execution order across a pipeline.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, name: &str) {
        self.calls.lock().push(name.to_string());
    }

    /// Returns the entries in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// How many times `name` was recorded.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == name).count()
    }
}

/// Work that records each call and succeeds with a fixed payload.
#[derive(Debug)]
pub struct RecordingWork {
    name: String,
    log: CallLog,
    payload: StepPayload,
}

impl RecordingWork {
    /// Creates work recording into `log` under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            payload: StepPayload::Empty,
        }
    }

    /// Sets the payload returned on success.
    #[must_use]
    pub fn with_payload(mut self, payload: StepPayload) -> Self {
        self.payload = payload;
        self
    }
}

#[async_trait]
impl UnitOfWork for RecordingWork {
    async fn run(&self) -> Result<StepPayload, ExportflowError> {
        self.log.record(&self.name);
        Ok(self.payload.clone())
    }

    fn describe(&self) -> String {
        format!("recording:{}", self.name)
    }
}

/// Which error a [`FailingWork`] raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// A nonzero process exit (retryable).
    Process,
    /// A lost connection (retryable).
    Connection,
    /// A plain step error (not retryable).
    Fatal,
}

/// Work that fails a set number of times, then succeeds.
#[derive(Debug)]
pub struct FailingWork {
    name: String,
    log: CallLog,
    mode: FailureMode,
    failures: Option<usize>,
}

impl FailingWork {
    /// Work that always fails with a nonzero process exit.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            mode: FailureMode::Process,
            failures: None,
        }
    }

    /// Sets the error raised.
    #[must_use]
    pub fn with_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fails only the first `n` calls.
    #[must_use]
    pub fn failing_times(mut self, n: usize) -> Self {
        self.failures = Some(n);
        self
    }

    fn error(&self, call: usize) -> ExportflowError {
        match self.mode {
            FailureMode::Process => ProcessExecutionError::exit(
                self.name.clone(),
                1,
                vec![format!("{} attempt {call}", self.name), "error".to_string()],
            )
            .into(),
            FailureMode::Connection => {
                ConnectionError::new(self.name.clone(), "connection reset").into()
            }
            FailureMode::Fatal => ExportflowError::step(format!("{} failed", self.name)),
        }
    }
}

#[async_trait]
impl UnitOfWork for FailingWork {
    async fn run(&self) -> Result<StepPayload, ExportflowError> {
        self.log.record(&self.name);
        let call = self.log.count(&self.name);
        match self.failures {
            Some(n) if call > n => Ok(StepPayload::Message(format!("succeeded on call {call}"))),
            _ => Err(self.error(call)),
        }
    }

    fn describe(&self) -> String {
        format!("failing:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_work() {
        let log = CallLog::new();
        let work = RecordingWork::new("a", &log).with_payload(StepPayload::Message("hi".into()));
        assert_eq!(work.run().await.unwrap(), StepPayload::Message("hi".into()));
        work.run().await.unwrap();
        assert_eq!(log.calls(), vec!["a", "a"]);
        assert_eq!(log.count("a"), 2);
    }

    #[tokio::test]
    async fn test_failing_work_modes() {
        let log = CallLog::new();
        let err = FailingWork::new("p", &log).run().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.transcript().map(<[String]>::len), Some(2));

        let err = FailingWork::new("c", &log)
            .with_mode(FailureMode::Connection)
            .run()
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let err = FailingWork::new("f", &log)
            .with_mode(FailureMode::Fatal)
            .run()
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_failing_times_then_succeeds() {
        let log = CallLog::new();
        let work = FailingWork::new("flaky", &log).failing_times(1);
        assert!(work.run().await.is_err());
        assert!(work.run().await.is_ok());
    }
}
