//! Error types for exportflow.
//!
//! Every failure a pipeline step can surface is one of the variants of
//! [`ExportflowError`]. The [`ErrorKind`] classification drives the retry
//! policy: connection and process failures are retryable, configuration and
//! statement failures are not.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for exportflow operations.
#[derive(Debug, Error)]
pub enum ExportflowError {
    /// Invalid or incomplete configuration.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A remote system could not be reached.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// A statement of a batch script failed.
    #[error("{0}")]
    StatementExecution(#[from] StatementExecutionError),

    /// A subprocess failed.
    #[error("{0}")]
    ProcessExecution(#[from] ProcessExecutionError),

    /// The pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure raised by an ad-hoc unit of work.
    #[error("Step error: {0}")]
    Step(String),
}

/// Coarse classification of an [`ExportflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Configuration error.
    Configuration,
    /// Connection error.
    Connection,
    /// Statement execution error.
    StatementExecution,
    /// Process execution error.
    ProcessExecution,
    /// Pipeline validation error.
    Validation,
    /// Local IO error.
    Io,
    /// Anything else.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Connection => write!(f, "connection"),
            Self::StatementExecution => write!(f, "statement_execution"),
            Self::ProcessExecution => write!(f, "process_execution"),
            Self::Validation => write!(f, "validation"),
            Self::Io => write!(f, "io"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl ErrorKind {
    /// Returns true if a failure of this kind may succeed when re-run.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection | Self::ProcessExecution)
    }
}

impl ExportflowError {
    /// Creates an ad-hoc step error.
    #[must_use]
    pub fn step(message: impl Into<String>) -> Self {
        Self::Step(message.into())
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Connection(_) => ErrorKind::Connection,
            Self::StatementExecution(_) => ErrorKind::StatementExecution,
            Self::ProcessExecution(_) => ErrorKind::ProcessExecution,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Io(_) => ErrorKind::Io,
            Self::Step(_) => ErrorKind::Other,
        }
    }

    /// Returns true if the retry policy may re-run the failed work.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Returns the captured subprocess transcript, if any.
    #[must_use]
    pub fn transcript(&self) -> Option<&[String]> {
        match self {
            Self::ProcessExecution(err) => Some(&err.transcript),
            _ => None,
        }
    }
}

/// Error raised before any remote call when configuration is unusable.
#[derive(Debug, Clone, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The offending setting, when one can be named.
    pub field: Option<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// A required setting is absent or empty.
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("missing required setting '{field}'"),
            field: Some(field),
        }
    }

    /// A setting is present but cannot be interpreted.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, value: impl fmt::Display) -> Self {
        let field = field.into();
        Self {
            message: format!("invalid value '{value}' for setting '{field}'"),
            field: Some(field),
        }
    }

    /// A script template still contains placeholders after substitution.
    #[must_use]
    pub fn unresolved_placeholders(names: &[String]) -> Self {
        Self {
            message: format!("unresolved template placeholder(s): {}", names.join(", ")),
            field: None,
        }
    }
}

/// Error raised when a database or object store cannot be reached.
#[derive(Debug, Clone, Error)]
#[error("Connection to {target} failed: {message}")]
pub struct ConnectionError {
    /// The remote endpoint.
    pub target: String,
    /// The underlying failure.
    pub message: String,
}

impl ConnectionError {
    /// Creates a new connection error.
    #[must_use]
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Error raised when one statement of a batch script fails.
///
/// Statements before `index` have already been applied; later ones never ran.
#[derive(Debug, Clone, Error)]
#[error("Statement {index} failed: {cause} (statement: {preview})")]
pub struct StatementExecutionError {
    /// 1-based position of the failed statement.
    pub index: usize,
    /// Truncated statement text.
    pub preview: String,
    /// Full statement text.
    pub statement: String,
    /// The error reported by the server or transport.
    pub cause: String,
}

impl StatementExecutionError {
    /// Creates a new statement execution error.
    #[must_use]
    pub fn new(
        index: usize,
        preview: impl Into<String>,
        statement: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            index,
            preview: preview.into(),
            statement: statement.into(),
            cause: cause.into(),
        }
    }
}

/// Why a subprocess failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessFailure {
    /// The process could not be started.
    Spawn,
    /// The process exited with a nonzero code.
    NonZeroExit,
    /// The process was terminated by a signal.
    Terminated,
    /// The process exceeded its configured timeout.
    TimedOut,
}

/// Error raised when a subprocess does not exit cleanly.
#[derive(Debug, Clone, Error)]
#[error("{}", self.describe())]
pub struct ProcessExecutionError {
    /// The command line, for display.
    pub command: String,
    /// The exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Every line the process wrote to stdout and stderr.
    pub transcript: Vec<String>,
    /// The failure mode.
    pub failure: ProcessFailure,
    /// Additional detail (spawn error message, timeout).
    pub detail: Option<String>,
}

impl ProcessExecutionError {
    /// The process exited with a nonzero code.
    #[must_use]
    pub fn exit(command: impl Into<String>, exit_code: i32, transcript: Vec<String>) -> Self {
        Self {
            command: command.into(),
            exit_code: Some(exit_code),
            transcript,
            failure: ProcessFailure::NonZeroExit,
            detail: None,
        }
    }

    /// The process was killed by a signal.
    #[must_use]
    pub fn terminated(command: impl Into<String>, transcript: Vec<String>) -> Self {
        Self {
            command: command.into(),
            exit_code: None,
            transcript,
            failure: ProcessFailure::Terminated,
            detail: None,
        }
    }

    /// The process could not be started.
    #[must_use]
    pub fn spawn(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit_code: None,
            transcript: Vec::new(),
            failure: ProcessFailure::Spawn,
            detail: Some(detail.into()),
        }
    }

    /// The process ran past its timeout and was killed.
    #[must_use]
    pub fn timed_out(
        command: impl Into<String>,
        timeout: std::time::Duration,
        transcript: Vec<String>,
    ) -> Self {
        Self {
            command: command.into(),
            exit_code: None,
            transcript,
            failure: ProcessFailure::TimedOut,
            detail: Some(format!("timed out after {}s", timeout.as_secs_f64())),
        }
    }

    /// Returns the captured output joined with newlines.
    #[must_use]
    pub fn output(&self) -> String {
        self.transcript.join("\n")
    }

    fn describe(&self) -> String {
        match self.failure {
            ProcessFailure::NonZeroExit => format!(
                "`{}` failed with return code {}",
                self.command,
                self.exit_code.unwrap_or(-1)
            ),
            ProcessFailure::Terminated => {
                format!("`{}` was terminated by a signal", self.command)
            }
            ProcessFailure::Spawn => format!(
                "Failed to spawn `{}`: {}",
                self.command,
                self.detail.as_deref().unwrap_or("unknown error")
            ),
            ProcessFailure::TimedOut => format!(
                "`{}` {}",
                self.command,
                self.detail.as_deref().unwrap_or("timed out")
            ),
        }
    }
}

/// Error raised when a pipeline definition is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The steps involved in the error.
    pub steps: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ExportflowError::from(ConnectionError::new("db", "refused")).is_retryable());
        assert!(ExportflowError::from(ProcessExecutionError::exit("dbt build", 1, vec![]))
            .is_retryable());
        assert!(!ExportflowError::from(ConfigurationError::missing_field("bucket")).is_retryable());
        assert!(!ExportflowError::from(StatementExecutionError::new(2, "DELETE", "DELETE", "boom"))
            .is_retryable());
        assert!(!ExportflowError::step("custom").is_retryable());
    }

    #[test]
    fn test_configuration_error_messages() {
        let err = ConfigurationError::missing_field("MINIO_ACCESS_KEY");
        assert_eq!(err.field.as_deref(), Some("MINIO_ACCESS_KEY"));
        assert!(err.to_string().contains("MINIO_ACCESS_KEY"));

        let err = ConfigurationError::unresolved_placeholders(&[
            "s3_bucket".to_string(),
            "s3_region".to_string(),
        ]);
        assert!(err.to_string().contains("s3_bucket, s3_region"));
    }

    #[test]
    fn test_statement_error_display() {
        let err = StatementExecutionError::new(3, "INSERT INTO t", "INSERT INTO t SELECT 1", "syntax");
        let msg = err.to_string();
        assert!(msg.contains("Statement 3"));
        assert!(msg.contains("syntax"));
        assert!(msg.contains("INSERT INTO t"));
    }

    #[test]
    fn test_process_error_keeps_transcript() {
        let err = ProcessExecutionError::exit(
            "npm run build",
            2,
            vec!["one".to_string(), "two".to_string()],
        );
        assert_eq!(err.to_string(), "`npm run build` failed with return code 2");
        assert_eq!(err.output(), "one\ntwo");

        let wrapped = ExportflowError::from(err);
        assert_eq!(wrapped.transcript().map(<[String]>::len), Some(2));
        assert_eq!(wrapped.kind(), ErrorKind::ProcessExecution);
    }

    #[test]
    fn test_spawn_error_display() {
        let err = ProcessExecutionError::spawn("rclone copy", "No such file or directory");
        assert!(err.to_string().contains("Failed to spawn `rclone copy`"));
        assert_eq!(err.failure, ProcessFailure::Spawn);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::StatementExecution.to_string(), "statement_execution");
        assert_eq!(ErrorKind::Connection.to_string(), "connection");
    }
}
