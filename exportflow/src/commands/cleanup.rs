use std::sync::Arc;

use anyhow::Result;
use exportflow::pipelines::{cleanup_pipeline, rclone_store};

/// Execute the `cleanup` command: the retention cleaner on its own.
pub async fn execute(retention_days: Option<u32>, prefix: Option<String>) -> Result<bool> {
    let mut settings = super::load_settings()?;
    if let Some(days) = retention_days {
        settings.retention.retention_days = days;
    }
    if let Some(prefix) = prefix {
        settings.retention.prefix = prefix;
    }

    let store = rclone_store(&settings.retention, settings.require_object_store()?);
    let pipeline = cleanup_pipeline(&settings.retention, Arc::new(store))?;

    super::run_and_report(pipeline).await
}
