use std::sync::Arc;

use anyhow::Result;
use exportflow::pipelines::{analytics_pipeline, rclone_store, AnalyticsOptions};

/// Execute the `analytics` command.
pub async fn execute(retention_days: Option<u32>, skip_publish: bool) -> Result<bool> {
    let mut settings = super::load_settings()?;
    if let Some(days) = retention_days {
        settings.retention.retention_days = days;
    }

    let store = rclone_store(&settings.retention, settings.require_object_store()?);
    let pipeline = analytics_pipeline(
        &settings.analytics,
        &settings.retention,
        Arc::new(store),
        AnalyticsOptions { skip_publish },
    )?;

    super::run_and_report(pipeline).await
}
