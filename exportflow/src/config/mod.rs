//! Configuration for the export and analytics pipelines.
//!
//! Settings are plain `serde` structs with defaults; [`Settings::from_env`]
//! fills them from the process environment.

mod credentials;
mod settings;

pub use credentials::ObjectStoreCredentials;
pub use settings::{
    object_store_from_lookup, AnalyticsSettings, ClickHouseSettings, ExportSettings,
    RetentionSettings, Settings,
};
