//! Testing utilities for exportflow pipelines.
//!
//! This module provides:
//! - Units of work that record calls or fail on demand
//! - In-memory database, object-store and event-sink doubles
//! - Assertions over pipeline runs

mod assertions;
mod doubles;
mod mocks;

pub use assertions::{
    assert_run_failed_at, assert_run_succeeded, assert_step_failed, assert_step_skipped,
    assert_step_status, assert_step_succeeded,
};
pub use doubles::{CollectingEventSink, InMemoryConnector, InMemoryObjectStore};
pub use mocks::{CallLog, FailingWork, FailureMode, RecordingWork};
