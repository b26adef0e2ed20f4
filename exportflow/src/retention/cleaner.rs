//! Age-based deletion of exported files.

use super::store::{ObjectStore, RetentionCandidate};
use crate::errors::ExportflowError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Counts from one retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    /// Objects listed under the prefix.
    pub checked: usize,
    /// Objects deleted.
    pub deleted: usize,
    /// Expired objects whose deletion failed.
    pub failed: usize,
    /// Bytes removed by successful deletions.
    pub bytes_freed: u64,
    /// Keys that could not be deleted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_keys: Vec<String>,
}

impl RetentionReport {
    /// True when some expired objects are still present.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

/// Deletes objects last modified before `now - retention_days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCleaner {
    retention_days: u32,
}

impl RetentionCleaner {
    /// Creates a cleaner keeping `retention_days` days of files.
    #[must_use]
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    /// Configured retention in days.
    #[must_use]
    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// The instant before which objects expire.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.retention_days))
    }

    /// Strictly older than the cutoff; an object exactly at the cutoff is kept.
    #[must_use]
    pub fn is_expired(candidate: &RetentionCandidate, cutoff: DateTime<Utc>) -> bool {
        candidate.last_modified < cutoff
    }

    /// Sweeps `prefix` in `store` relative to the current time.
    pub async fn clean(
        &self,
        store: &dyn ObjectStore,
        prefix: &str,
    ) -> Result<RetentionReport, ExportflowError> {
        self.clean_at(store, prefix, Utc::now()).await
    }

    /// Sweeps `prefix` in `store` relative to `now`.
    ///
    /// A failed listing fails the sweep. A failed deletion is logged, counted
    /// and skipped.
    pub async fn clean_at(
        &self,
        store: &dyn ObjectStore,
        prefix: &str,
        now: DateTime<Utc>,
    ) -> Result<RetentionReport, ExportflowError> {
        let cutoff = self.cutoff(now);
        info!(
            location = %store.location(),
            prefix = %prefix,
            retention_days = self.retention_days,
            cutoff = %cutoff.to_rfc3339(),
            "Cleaning up exported files"
        );

        let candidates = store.list(prefix).await?;
        let mut report = RetentionReport {
            checked: candidates.len(),
            ..RetentionReport::default()
        };

        for candidate in candidates.iter().filter(|c| Self::is_expired(c, cutoff)) {
            match store.delete(&candidate.key).await {
                Ok(()) => {
                    info!(
                        key = %candidate.key,
                        age_days = candidate.age_days(now),
                        size = candidate.size,
                        "Deleted expired file"
                    );
                    report.deleted += 1;
                    report.bytes_freed += candidate.size;
                }
                Err(e) => {
                    warn!(key = %candidate.key, error = %e, "Failed to delete expired file");
                    report.failed += 1;
                    report.failed_keys.push(candidate.key.clone());
                }
            }
        }

        if report.is_partial() {
            warn!(
                deleted = report.deleted,
                failed = report.failed,
                "Partial cleanup: some expired files were not deleted"
            );
        } else {
            info!(
                checked = report.checked,
                deleted = report.deleted,
                bytes_freed = report.bytes_freed,
                "Cleanup complete"
            );
        }
        Ok(report)
    }
}
