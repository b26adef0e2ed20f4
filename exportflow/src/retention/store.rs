//! The object-store seam used by the retention cleaner.

use crate::errors::ExportflowError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An object that may be old enough to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionCandidate {
    /// Object key within the bucket.
    pub key: String,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Size in bytes.
    pub size: u64,
}

impl RetentionCandidate {
    /// Creates a candidate.
    #[must_use]
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>, size: u64) -> Self {
        Self {
            key: key.into(),
            last_modified,
            size,
        }
    }

    /// Whole days between the last modification and `now`.
    #[must_use]
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_modified).num_days()
    }
}

/// A bucket of exported files.
///
/// Only listing and deletion are needed; object content is never read.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location, for logs.
    fn location(&self) -> String;

    /// Lists every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<RetentionCandidate>, ExportflowError>;

    /// Deletes one object.
    async fn delete(&self, key: &str) -> Result<(), ExportflowError>;
}

/// One line of a storage listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedObject {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Age in whole days.
    pub age_days: i64,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
}

/// Objects under a prefix with their ages, for inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageListing {
    /// Where the listing came from.
    pub location: String,
    /// The prefix listed.
    pub prefix: String,
    /// Objects, oldest first.
    pub objects: Vec<ListedObject>,
    /// Sum of object sizes.
    pub total_bytes: u64,
}

impl StorageListing {
    /// Lists `prefix` in `store`, computing ages relative to `now`.
    pub async fn collect(
        store: &dyn ObjectStore,
        prefix: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, ExportflowError> {
        let mut candidates = store.list(prefix).await?;
        candidates.sort_by(|a, b| a.last_modified.cmp(&b.last_modified).then_with(|| a.key.cmp(&b.key)));

        let total_bytes = candidates.iter().map(|c| c.size).sum();
        let objects = candidates
            .into_iter()
            .map(|c| ListedObject {
                age_days: c.age_days(now),
                key: c.key,
                size: c.size,
                last_modified: c.last_modified,
            })
            .collect();

        Ok(Self {
            location: store.location(),
            prefix: prefix.to_string(),
            objects,
            total_bytes,
        })
    }
}
