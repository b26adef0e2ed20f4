//! The ClickHouse to object storage export pipeline.

use crate::config::{ExportSettings, ObjectStoreCredentials};
use crate::errors::ExportflowError;
use crate::pipeline::{ExportMode, PipelineBuilder, PipelineExecutor, SqlExportWork, Step};
use crate::sql::{BatchSqlExecutor, SqlConnector, SqlScript, TemplateVariables};
use std::sync::Arc;

/// Pipeline name.
pub const EXPORT_PIPELINE: &str = "clickhouse-export";

/// Name of the single export step.
pub const EXPORT_STEP: &str = "execute-export-script";

/// Builds the export step for an already loaded script.
#[must_use]
pub fn export_step(
    settings: &ExportSettings,
    script: SqlScript,
    connector: Arc<dyn SqlConnector>,
    mode: ExportMode,
) -> Step {
    let work = SqlExportWork::new(connector, script, mode)
        .with_executor(BatchSqlExecutor::new(&settings.table));
    Step::new(EXPORT_STEP, work).with_retries(settings.retries)
}

/// Loads the script at `settings.script_path`, binds the storage variables
/// and builds the export pipeline.
///
/// # Errors
///
/// Fails when the credentials are incomplete or the script cannot be read.
pub fn export_pipeline(
    settings: &ExportSettings,
    credentials: &ObjectStoreCredentials,
    connector: Arc<dyn SqlConnector>,
    mode: ExportMode,
) -> Result<PipelineExecutor, ExportflowError> {
    credentials.validate()?;
    let variables = TemplateVariables::for_object_store(credentials, &settings.bucket);
    let script = SqlScript::from_file(&settings.script_path, variables)?;

    tracing::info!(
        script = %settings.script_path.display(),
        bucket = %settings.bucket,
        %mode,
        "Export pipeline configured"
    );

    let pipeline = PipelineBuilder::new(EXPORT_PIPELINE)
        .step(export_step(settings, script, connector, mode))
        .build()?;
    Ok(pipeline)
}
