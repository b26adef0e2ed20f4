//! Runtime settings read from the process environment.
//!
//! Every loader takes a lookup function so tests can supply values without
//! touching the real environment.

use super::ObjectStoreCredentials;
use crate::errors::ConfigurationError;
use crate::sql::DEFAULT_EXPORT_TABLE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

fn get<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn string_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    get(lookup, key).unwrap_or_else(|| default.to_string())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(lookup, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigurationError::invalid_value(key, raw)),
        None => Ok(default),
    }
}

fn flag_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(lookup, key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigurationError::invalid_value(key, raw)),
        },
        None => Ok(default),
    }
}

/// Connection settings for the ClickHouse HTTP interface.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickHouseSettings {
    /// Server hostname.
    pub host: String,
    /// HTTP port (8123 by default; the native protocol port will not work).
    pub port: u16,
    /// User name.
    pub user: String,
    /// Password.
    #[serde(skip_serializing)]
    pub password: String,
    /// Database selected for every query.
    pub database: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: f64,
}

impl Default for ClickHouseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            user: "default".to_string(),
            password: String::new(),
            database: "playground".to_string(),
            timeout_seconds: 300.0,
        }
    }
}

impl std::fmt::Debug for ClickHouseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish_non_exhaustive()
    }
}

impl ClickHouseSettings {
    /// Reads `CLICKHOUSE_*` variables.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let timeout_seconds: f64 =
            parse_or(lookup, "CLICKHOUSE_TIMEOUT_SECONDS", defaults.timeout_seconds)?;
        if !timeout_seconds.is_finite() || timeout_seconds <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "CLICKHOUSE_TIMEOUT_SECONDS",
                timeout_seconds,
            ));
        }

        Ok(Self {
            host: string_or(lookup, "CLICKHOUSE_HOST", &defaults.host),
            port: parse_or(lookup, "CLICKHOUSE_PORT", defaults.port)?,
            user: string_or(lookup, "CLICKHOUSE_USER", &defaults.user),
            password: lookup("CLICKHOUSE_PASSWORD").unwrap_or_default(),
            database: string_or(lookup, "CLICKHOUSE_DATABASE", &defaults.database),
            timeout_seconds,
        })
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }
}

/// Reads `MINIO_ENDPOINT`, `MINIO_ACCESS_KEY`, `MINIO_SECRET_KEY` and the
/// optional `MINIO_REGION`.
///
/// Returns `Ok(None)` when no endpoint is configured at all.
pub fn object_store_from_lookup<F>(lookup: &F) -> Result<Option<ObjectStoreCredentials>, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(endpoint) = get(lookup, "MINIO_ENDPOINT") else {
        return Ok(None);
    };
    let access_key =
        get(lookup, "MINIO_ACCESS_KEY").ok_or_else(|| ConfigurationError::missing_field("MINIO_ACCESS_KEY"))?;
    let secret_key =
        get(lookup, "MINIO_SECRET_KEY").ok_or_else(|| ConfigurationError::missing_field("MINIO_SECRET_KEY"))?;

    let mut credentials = ObjectStoreCredentials::new(endpoint, access_key, secret_key);
    if let Some(region) = get(lookup, "MINIO_REGION") {
        credentials = credentials.with_region(region);
    }
    Ok(Some(credentials))
}

/// Settings for the ClickHouse export pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Destination bucket for exported files.
    pub bucket: String,
    /// Path of the SQL script template.
    pub script_path: PathBuf,
    /// Table counted by the dry run.
    pub table: String,
    /// Count rows only, do not export or delete.
    pub dry_run: bool,
    /// Retries for the export step.
    pub retries: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            bucket: "ipfix".to_string(),
            script_path: PathBuf::from("scripts/ipfix-export.sql"),
            table: DEFAULT_EXPORT_TABLE.to_string(),
            dry_run: true,
            retries: 2,
        }
    }
}

impl ExportSettings {
    /// Reads `MINIO_BUCKET`, `EXPORT_SCRIPT_PATH`, `EXPORT_TABLE`,
    /// `EXPORT_DRY_RUN` and `EXPORT_RETRIES`.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bucket: string_or(lookup, "MINIO_BUCKET", &defaults.bucket),
            script_path: get(lookup, "EXPORT_SCRIPT_PATH")
                .map_or(defaults.script_path, PathBuf::from),
            table: string_or(lookup, "EXPORT_TABLE", &defaults.table),
            dry_run: flag_or(lookup, "EXPORT_DRY_RUN", defaults.dry_run)?,
            retries: parse_or(lookup, "EXPORT_RETRIES", defaults.retries)?,
        })
    }
}

/// Settings for the analytics refresh pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSettings {
    /// Project root; the dbt and evidence directories are relative to it.
    pub project_dir: PathBuf,
    /// dbt project directory.
    pub dbt_dir: PathBuf,
    /// Evidence project directory.
    pub evidence_dir: PathBuf,
    /// rclone destination for the built site.
    pub publish_target: String,
    /// Retries for `dbt build`.
    pub build_retries: u32,
    /// Retries for the publish step.
    pub publish_retries: u32,
    /// Optional limit on each external command, in seconds.
    pub command_timeout_seconds: Option<u64>,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            dbt_dir: PathBuf::from("dbt"),
            evidence_dir: PathBuf::from("evidence"),
            publish_target: "r2:ipfix-analytics".to_string(),
            build_retries: 2,
            publish_retries: 2,
            command_timeout_seconds: None,
        }
    }
}

impl AnalyticsSettings {
    /// Reads `PROJECT_DIR`, `DBT_DIR`, `EVIDENCE_DIR`, `PUBLISH_TARGET` and
    /// `COMMAND_TIMEOUT_SECONDS`.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let command_timeout_seconds = match get(lookup, "COMMAND_TIMEOUT_SECONDS") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigurationError::invalid_value("COMMAND_TIMEOUT_SECONDS", raw))?,
            ),
            None => None,
        };

        Ok(Self {
            project_dir: get(lookup, "PROJECT_DIR").map_or(defaults.project_dir, PathBuf::from),
            dbt_dir: get(lookup, "DBT_DIR").map_or(defaults.dbt_dir, PathBuf::from),
            evidence_dir: get(lookup, "EVIDENCE_DIR").map_or(defaults.evidence_dir, PathBuf::from),
            publish_target: string_or(lookup, "PUBLISH_TARGET", &defaults.publish_target),
            build_retries: defaults.build_retries,
            publish_retries: defaults.publish_retries,
            command_timeout_seconds,
        })
    }

    /// Absolute-or-relative path of the dbt project.
    #[must_use]
    pub fn dbt_path(&self) -> PathBuf {
        self.project_dir.join(&self.dbt_dir)
    }

    /// Absolute-or-relative path of the Evidence project.
    #[must_use]
    pub fn evidence_path(&self) -> PathBuf {
        self.project_dir.join(&self.evidence_dir)
    }

    /// Per-command timeout, if configured.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_seconds.map(Duration::from_secs)
    }
}

/// Settings for retiring exported files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Files older than this many days are deleted.
    pub retention_days: u32,
    /// Bucket holding the exported files.
    pub bucket: String,
    /// Key prefix of the exported files.
    pub prefix: String,
    /// rclone remote name used for the store.
    pub remote_name: String,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            retention_days: 5,
            bucket: "ipfix".to_string(),
            prefix: "ipfix_".to_string(),
            remote_name: "minio".to_string(),
        }
    }
}

impl RetentionSettings {
    /// Reads `RETENTION_DAYS`, `MINIO_BUCKET` and `RETENTION_PREFIX`.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            retention_days: parse_or(lookup, "RETENTION_DAYS", defaults.retention_days)?,
            bucket: string_or(lookup, "MINIO_BUCKET", &defaults.bucket),
            prefix: lookup("RETENTION_PREFIX").unwrap_or(defaults.prefix),
            remote_name: defaults.remote_name,
        })
    }
}

/// All settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Database connection.
    pub clickhouse: ClickHouseSettings,
    /// Object-store credentials, when configured.
    pub object_store: Option<ObjectStoreCredentials>,
    /// Export pipeline.
    pub export: ExportSettings,
    /// Analytics pipeline.
    pub analytics: AnalyticsSettings,
    /// Retention cleanup.
    pub retention: RetentionSettings,
}

impl Settings {
    /// Loads every section through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            clickhouse: ClickHouseSettings::from_lookup(&lookup)?,
            object_store: object_store_from_lookup(&lookup)?,
            export: ExportSettings::from_lookup(&lookup)?,
            analytics: AnalyticsSettings::from_lookup(&lookup)?,
            retention: RetentionSettings::from_lookup(&lookup)?,
        })
    }

    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Returns the object-store credentials or a configuration error.
    pub fn require_object_store(&self) -> Result<&ObjectStoreCredentials, ConfigurationError> {
        let credentials = self
            .object_store
            .as_ref()
            .ok_or_else(|| ConfigurationError::missing_field("MINIO_ENDPOINT"))?;
        credentials.validate()?;
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.clickhouse, ClickHouseSettings::default());
        assert_eq!(settings.export, ExportSettings::default());
        assert_eq!(settings.retention.retention_days, 5);
        assert!(settings.export.dry_run);
        assert!(settings.object_store.is_none());
        assert!(settings.require_object_store().is_err());
    }

    #[test]
    fn test_reads_clickhouse_variables() {
        let settings = ClickHouseSettings::from_lookup(&lookup(&[
            ("CLICKHOUSE_HOST", "clickhouse"),
            ("CLICKHOUSE_PORT", "18123"),
            ("CLICKHOUSE_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert_eq!(settings.host, "clickhouse");
        assert_eq!(settings.port, 18123);
        assert_eq!(settings.password, "pw");
        assert_eq!(settings.database, "playground");
        assert!(!format!("{settings:?}").contains("pw\""));
    }

    #[test]
    fn test_invalid_port_is_configuration_error() {
        let err = ClickHouseSettings::from_lookup(&lookup(&[("CLICKHOUSE_PORT", "http")]))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("CLICKHOUSE_PORT"));
    }

    #[test]
    fn test_object_store_requires_keys_once_endpoint_is_set() {
        let err = object_store_from_lookup(&lookup(&[("MINIO_ENDPOINT", "https://s3")]))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("MINIO_ACCESS_KEY"));

        let creds = object_store_from_lookup(&lookup(&[
            ("MINIO_ENDPOINT", "https://s3"),
            ("MINIO_ACCESS_KEY", "a"),
            ("MINIO_SECRET_KEY", "s"),
            ("MINIO_REGION", "us-east-1"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(creds.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_dry_run_flag_parsing() {
        let live = ExportSettings::from_lookup(&lookup(&[("EXPORT_DRY_RUN", "false")])).unwrap();
        assert!(!live.dry_run);

        let err = ExportSettings::from_lookup(&lookup(&[("EXPORT_DRY_RUN", "maybe")])).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("EXPORT_DRY_RUN"));
    }

    #[test]
    fn test_retention_days_must_be_non_negative_integer() {
        let err = RetentionSettings::from_lookup(&lookup(&[("RETENTION_DAYS", "-1")])).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("RETENTION_DAYS"));

        let settings = RetentionSettings::from_lookup(&lookup(&[("RETENTION_DAYS", "14")])).unwrap();
        assert_eq!(settings.retention_days, 14);
    }

    #[test]
    fn test_analytics_paths_are_joined() {
        let settings = AnalyticsSettings::from_lookup(&lookup(&[
            ("PROJECT_DIR", "/srv/ipfix"),
            ("COMMAND_TIMEOUT_SECONDS", "600"),
        ]))
        .unwrap();
        assert_eq!(settings.dbt_path(), PathBuf::from("/srv/ipfix/dbt"));
        assert_eq!(settings.evidence_path(), PathBuf::from("/srv/ipfix/evidence"));
        assert_eq!(settings.command_timeout(), Some(Duration::from_secs(600)));
    }
}
