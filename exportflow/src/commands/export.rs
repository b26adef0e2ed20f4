use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use exportflow::pipeline::ExportMode;
use exportflow::pipelines::export_pipeline;
use exportflow::sql::ClickHouseConnector;

/// Execute the `export` command: dry run unless `live`.
pub async fn execute(live: bool, script: Option<PathBuf>) -> Result<bool> {
    let mut settings = super::load_settings()?;
    if let Some(path) = script {
        settings.export.script_path = path;
    }
    let mode = if live {
        ExportMode::Live
    } else {
        ExportMode::from_dry_run(settings.export.dry_run)
    };

    let credentials = settings.require_object_store()?;
    let connector = ClickHouseConnector::new(settings.clickhouse.clone())?;
    let pipeline = export_pipeline(&settings.export, credentials, Arc::new(connector), mode)
        .with_context(|| format!("Failed to prepare export from {}", settings.export.script_path.display()))?;

    super::run_and_report(pipeline).await
}
