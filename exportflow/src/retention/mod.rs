//! Retirement of exported files after a retention period.

mod cleaner;
mod rclone;
mod store;

pub use cleaner::{RetentionCleaner, RetentionReport};
pub use rclone::{parse_listing, remote_env, RcloneObjectStore};
pub use store::{ListedObject, ObjectStore, RetentionCandidate, StorageListing};
