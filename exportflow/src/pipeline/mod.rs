//! Pipeline building and execution.
//!
//! This module provides:
//! - Steps and the units of work they wrap
//! - Retry policies
//! - A validating builder
//! - The sequential, fail-fast executor

mod builder;
mod executor;
mod retry;
mod step;
mod work;


pub use builder::PipelineBuilder;
pub use executor::PipelineExecutor;
pub use retry::{Attempted, BackoffStrategy, JitterStrategy, RetryNotice, RetryPolicy};
pub use step::{Step, UnitOfWork};
pub use work::{ExportMode, FnWork, ProcessWork, RetentionWork, SqlExportWork};
