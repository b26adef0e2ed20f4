pub mod analytics;
pub mod check_storage;
pub mod cleanup;
pub mod export;

use std::sync::Arc;

use anyhow::{Context, Result};
use exportflow::config::Settings;
use exportflow::core::PipelineRun;
use exportflow::events::LoggingEventSink;
use exportflow::pipeline::PipelineExecutor;

/// Reads settings from the environment.
pub fn load_settings() -> Result<Settings> {
    Settings::from_env().context("Invalid configuration")
}

/// Runs `pipeline` with lifecycle events logged at debug level, prints the
/// run summary to stdout and reports whether it succeeded.
pub async fn run_and_report(pipeline: PipelineExecutor) -> Result<bool> {
    let run = pipeline
        .with_events(Arc::new(LoggingEventSink))
        .run()
        .await;
    print_summary(&run)?;
    Ok(run.is_success())
}

fn print_summary(run: &PipelineRun) -> Result<()> {
    let summary = serde_json::to_string_pretty(run).context("Failed to serialize run summary")?;
    println!("{summary}");
    Ok(())
}
