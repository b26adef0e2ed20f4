//! # Exportflow
//!
//! Scheduled data pipelines that move flow records out of ClickHouse into
//! object storage and rebuild the analytics site on top of them.
//!
//! Exportflow provides:
//!
//! - **Statement splitting**: turn a templated SQL script into executable statements
//! - **Batch SQL execution**: run a script over one connection, or count rows in dry-run mode
//! - **Process running**: stream a subprocess's merged output line by line
//! - **Fail-fast pipelines**: ordered steps with per-step retries and a gated finalizer
//! - **Retention**: delete exported files older than a cutoff
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use exportflow::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("analytics")
//!     .step(Step::new("dbt-build", ProcessWork::new(CommandSpec::new("dbt").arg("build"))).with_retries(2))
//!     .finalizer(Step::new("cleanup", RetentionWork::new(RetentionCleaner::new(5), store, "ipfix_")))
//!     .build()?;
//!
//! let run = pipeline.run().await;
//! assert!(run.is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod pipelines;
pub mod process;
pub mod retention;
pub mod sql;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ObjectStoreCredentials, Settings};
    pub use crate::core::{PipelineRun, RunOutcome, StepOutcome, StepPayload, StepResult, StepStatus};
    pub use crate::errors::{
        ConfigurationError, ConnectionError, ErrorKind, ExportflowError, PipelineValidationError,
        ProcessExecutionError, StatementExecutionError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        ExportMode, PipelineBuilder, PipelineExecutor, ProcessWork, RetentionWork, RetryPolicy,
        SqlExportWork, Step, UnitOfWork,
    };
    pub use crate::process::{CommandSpec, LineSink, ProcessRunner};
    pub use crate::retention::{ObjectStore, RetentionCleaner, RetentionReport};
    pub use crate::sql::{split, BatchSqlExecutor, SqlConnector, SqlScript, Statement, TemplateVariables};
}
