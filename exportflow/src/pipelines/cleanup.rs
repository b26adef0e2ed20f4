//! Retirement of exported files from the storage bucket.

use crate::config::{ObjectStoreCredentials, RetentionSettings};
use crate::errors::PipelineValidationError;
use crate::pipeline::{PipelineBuilder, PipelineExecutor, RetentionWork, Step};
use crate::retention::{ObjectStore, RcloneObjectStore, RetentionCleaner};
use std::sync::Arc;

/// Pipeline name when cleanup runs on its own.
pub const CLEANUP_PIPELINE: &str = "retention-cleanup";

/// Name of the cleanup step, also used as the analytics finalizer.
pub const CLEANUP_STEP: &str = "cleanup-exported-files";

/// The rclone-backed store holding exported files.
#[must_use]
pub fn rclone_store(settings: &RetentionSettings, credentials: &ObjectStoreCredentials) -> RcloneObjectStore {
    RcloneObjectStore::for_credentials(&settings.remote_name, &settings.bucket, credentials)
}

/// A step deleting files under `settings.prefix` older than the retention
/// window.
#[must_use]
pub fn cleanup_step(settings: &RetentionSettings, store: Arc<dyn ObjectStore>) -> Step {
    let cleaner = RetentionCleaner::new(settings.retention_days);
    Step::new(CLEANUP_STEP, RetentionWork::new(cleaner, store, &settings.prefix))
}

/// A pipeline consisting of the cleanup step alone.
pub fn cleanup_pipeline(
    settings: &RetentionSettings,
    store: Arc<dyn ObjectStore>,
) -> Result<PipelineExecutor, PipelineValidationError> {
    PipelineBuilder::new(CLEANUP_PIPELINE)
        .step(cleanup_step(settings, store))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepPayload;
    use crate::testing::{assert_run_succeeded, InMemoryObjectStore};
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cleanup_pipeline_honours_settings() {
        let now = Utc::now();
        let store = Arc::new(InMemoryObjectStore::new());
        store.insert("ipfix_a.parquet", now - Duration::days(3), 10);
        store.insert("ipfix_b.parquet", now - Duration::days(1), 10);
        store.insert("netflow_c.parquet", now - Duration::days(30), 10);

        let settings = RetentionSettings {
            retention_days: 2,
            ..RetentionSettings::default()
        };
        let run = cleanup_pipeline(&settings, store.clone()).unwrap().run().await;

        assert_run_succeeded(&run);
        let Some(StepPayload::Retention(report)) = run.step(CLEANUP_STEP).and_then(|r| r.payload()) else {
            panic!("expected retention payload");
        };
        assert_eq!(report.checked, 2);
        assert_eq!(report.deleted, 1);
        assert_eq!(store.keys(), vec!["ipfix_b.parquet", "netflow_c.parquet"]);
    }

    #[test]
    fn test_rclone_store_uses_remote_and_bucket() {
        let settings = RetentionSettings::default();
        let credentials = ObjectStoreCredentials::new("http://minio:9000", "AKIA", "s3cr3t");
        let store = rclone_store(&settings, &credentials);
        assert_eq!(store.root(), "minio:ipfix");
        assert_eq!(
            store.env().get("RCLONE_CONFIG_MINIO_ENDPOINT").map(String::as_str),
            Some("http://minio:9000")
        );
    }
}
