//! The concrete units of work pipelines are built from.

use super::step::UnitOfWork;
use crate::core::StepPayload;
use crate::errors::ExportflowError;
use crate::process::{CommandSpec, LineSink, ProcessRunner, TracingLineSink};
use crate::retention::{ObjectStore, RetentionCleaner};
use crate::sql::{split, BatchSqlExecutor, SqlConnector, SqlScript};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Runs one external command, streaming its output.
pub struct ProcessWork {
    runner: ProcessRunner,
    spec: CommandSpec,
    sink: Arc<dyn LineSink>,
}

impl ProcessWork {
    /// Runs `spec`, logging each output line through `tracing`.
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        let sink = Arc::new(TracingLineSink::new(spec.program.clone()));
        Self {
            runner: ProcessRunner::new(),
            spec,
            sink,
        }
    }

    /// Sends output lines to `sink` instead.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Uses a custom runner.
    #[must_use]
    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    /// The command run.
    #[must_use]
    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }
}

#[async_trait]
impl UnitOfWork for ProcessWork {
    async fn run(&self) -> Result<StepPayload, ExportflowError> {
        let result = self.runner.run(&self.spec, self.sink.as_ref()).await?;
        Ok(StepPayload::Process(result))
    }

    fn describe(&self) -> String {
        self.spec.to_string()
    }
}

/// Whether the export script runs or only rows are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Count rows only; never write.
    #[default]
    DryRun,
    /// Execute every statement of the script.
    Live,
}

impl ExportMode {
    /// `DryRun` when `dry_run` is true.
    #[must_use]
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            Self::DryRun
        } else {
            Self::Live
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry_run"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// Renders an export script and runs it, or counts rows in dry-run mode.
///
/// Template rendering happens first in both modes, so an unresolved
/// placeholder fails before the database is contacted.
pub struct SqlExportWork {
    connector: Arc<dyn SqlConnector>,
    script: SqlScript,
    executor: BatchSqlExecutor,
    mode: ExportMode,
}

impl SqlExportWork {
    /// Creates export work with the default executor.
    #[must_use]
    pub fn new(connector: Arc<dyn SqlConnector>, script: SqlScript, mode: ExportMode) -> Self {
        Self {
            connector,
            script,
            executor: BatchSqlExecutor::default(),
            mode,
        }
    }

    /// Uses `executor` (e.g. for a different table).
    #[must_use]
    pub fn with_executor(mut self, executor: BatchSqlExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// The configured mode.
    #[must_use]
    pub fn mode(&self) -> ExportMode {
        self.mode
    }
}

#[async_trait]
impl UnitOfWork for SqlExportWork {
    async fn run(&self) -> Result<StepPayload, ExportflowError> {
        let rendered = self.script.render()?;
        info!(mode = %self.mode, "Template variables substituted");

        match self.mode {
            ExportMode::DryRun => {
                let accounting = self.executor.execute_dry_run(self.connector.as_ref()).await?;
                info!("Dry run complete, no data was exported or deleted");
                Ok(StepPayload::DryRun(accounting))
            }
            ExportMode::Live => {
                let statements = split(&rendered);
                info!(count = statements.len(), "Parsed SQL statements from script");
                let report = self
                    .executor
                    .execute_script(self.connector.as_ref(), &statements)
                    .await?;
                Ok(StepPayload::Statements(report))
            }
        }
    }

    fn describe(&self) -> String {
        format!("sql-export({}) on {}", self.mode, self.connector.target())
    }
}

/// Deletes expired files under a prefix.
pub struct RetentionWork {
    cleaner: RetentionCleaner,
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl RetentionWork {
    /// Creates retention work.
    #[must_use]
    pub fn new(cleaner: RetentionCleaner, store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            cleaner,
            store,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl UnitOfWork for RetentionWork {
    async fn run(&self) -> Result<StepPayload, ExportflowError> {
        let report = self.cleaner.clean(self.store.as_ref(), &self.prefix).await?;
        Ok(StepPayload::Retention(report))
    }

    fn describe(&self) -> String {
        format!(
            "retention({}d) on {}/{}",
            self.cleaner.retention_days(),
            self.store.location(),
            self.prefix
        )
    }
}

/// Work backed by an async closure.
pub struct FnWork<F> {
    func: F,
}

impl<F, Fut> FnWork<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepPayload, ExportflowError>> + Send,
{
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> UnitOfWork for FnWork<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepPayload, ExportflowError>> + Send,
{
    async fn run(&self) -> Result<StepPayload, ExportflowError> {
        (self.func)().await
    }

    fn describe(&self) -> String {
        "fn".to_string()
    }
}
