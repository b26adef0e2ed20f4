//! The concrete pipelines run by the `exportflow` binary.

pub mod analytics;
pub mod cleanup;
pub mod export;

pub use analytics::{analytics_pipeline, AnalyticsOptions, ANALYTICS_PIPELINE};
pub use cleanup::{cleanup_pipeline, cleanup_step, rclone_store, CLEANUP_PIPELINE, CLEANUP_STEP};
pub use export::{export_pipeline, export_step, EXPORT_PIPELINE, EXPORT_STEP};
