//! [`ObjectStore`] backed by the `rclone` command line tool.
//!
//! The remote is defined entirely through `RCLONE_CONFIG_<REMOTE>_*`
//! variables passed to each child process, so no rclone config file is
//! needed and credentials never leave this process's children.

use super::store::{ObjectStore, RetentionCandidate};
use crate::config::ObjectStoreCredentials;
use crate::errors::ExportflowError;
use crate::process::{CommandSpec, NullLineSink, ProcessRunner};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One entry of `rclone lsjson` output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsJsonEntry {
    path: String,
    size: i64,
    mod_time: DateTime<Utc>,
    #[serde(default)]
    is_dir: bool,
}

/// A bucket reached through an rclone remote.
#[derive(Debug, Clone)]
pub struct RcloneObjectStore {
    runner: ProcessRunner,
    program: String,
    remote: String,
    bucket: String,
    env: BTreeMap<String, String>,
}

impl RcloneObjectStore {
    /// Uses an already configured rclone remote.
    #[must_use]
    pub fn new(remote: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            runner: ProcessRunner::new(),
            program: "rclone".to_string(),
            remote: remote.into(),
            bucket: bucket.into(),
            env: BTreeMap::new(),
        }
    }

    /// Defines `remote` as an S3-compatible (MinIO) remote from `credentials`.
    #[must_use]
    pub fn for_credentials(
        remote: impl Into<String>,
        bucket: impl Into<String>,
        credentials: &ObjectStoreCredentials,
    ) -> Self {
        let mut store = Self::new(remote, bucket);
        store.env = remote_env(&store.remote, credentials);
        store
    }

    /// Overrides the rclone executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// `remote:bucket`
    #[must_use]
    pub fn root(&self) -> String {
        format!("{}:{}", self.remote, self.bucket)
    }

    /// Environment passed to every rclone invocation.
    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.program).envs(self.env.clone())
    }

    /// The `rclone lsjson` invocation used by [`ObjectStore::list`].
    ///
    /// Only stdout is captured so log lines on stderr cannot corrupt the JSON.
    #[must_use]
    pub fn list_command(&self) -> CommandSpec {
        self.command()
            .args(["lsjson", "--recursive", "--files-only", "--quiet"])
            .arg(self.root())
            .stdout_only()
    }

    /// The `rclone deletefile` invocation used by [`ObjectStore::delete`].
    #[must_use]
    pub fn delete_command(&self, key: &str) -> CommandSpec {
        self.command()
            .args(["deletefile", "--quiet"])
            .arg(format!("{}/{}", self.root(), key))
    }
}

/// `RCLONE_CONFIG_<REMOTE>_*` variables describing an S3 remote.
#[must_use]
pub fn remote_env(remote: &str, credentials: &ObjectStoreCredentials) -> BTreeMap<String, String> {
    let name: String = remote
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    let key = |suffix: &str| format!("RCLONE_CONFIG_{name}_{suffix}");

    let mut env = BTreeMap::new();
    env.insert(key("TYPE"), "s3".to_string());
    env.insert(key("PROVIDER"), "Minio".to_string());
    env.insert(key("ACCESS_KEY_ID"), credentials.access_key.clone());
    env.insert(key("SECRET_ACCESS_KEY"), credentials.secret_key.clone());
    env.insert(key("ENDPOINT"), credentials.endpoint_url.clone());
    if let Some(region) = &credentials.region {
        env.insert(key("REGION"), region.clone());
    }
    env
}

/// Parses `rclone lsjson` output, keeping files whose path starts with `prefix`.
///
/// Anything before the opening `[` (stray log lines) is ignored.
pub fn parse_listing(output: &str, prefix: &str) -> Result<Vec<RetentionCandidate>, ExportflowError> {
    let start = output.find('[').unwrap_or(output.len());
    let json = output[start..].trim();
    if json.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<LsJsonEntry> = serde_json::from_str(json)
        .map_err(|e| ExportflowError::step(format!("Invalid rclone listing: {e}")))?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.is_dir && e.path.starts_with(prefix))
        .map(|e| RetentionCandidate::new(e.path, e.mod_time, u64::try_from(e.size).unwrap_or(0)))
        .collect())
}

#[async_trait]
impl ObjectStore for RcloneObjectStore {
    fn location(&self) -> String {
        self.root()
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RetentionCandidate>, ExportflowError> {
        let result = self.runner.run(&self.list_command(), &NullLineSink).await?;
        for line in &result.diagnostics {
            warn!(location = %self.root(), line = %line, "rclone");
        }
        let candidates = parse_listing(&result.output(), prefix)?;
        debug!(location = %self.root(), prefix = %prefix, count = candidates.len(), "Listed objects");
        Ok(candidates)
    }

    async fn delete(&self, key: &str) -> Result<(), ExportflowError> {
        self.runner.run(&self.delete_command(key), &NullLineSink).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LISTING: &str = r#"[
{"Path":"ipfix_20240101.parquet","Name":"ipfix_20240101.parquet","Size":2048,"MimeType":"application/octet-stream","ModTime":"2024-01-01T10:00:00.123456789Z","IsDir":false},
{"Path":"archive","Name":"archive","Size":-1,"MimeType":"inode/directory","ModTime":"2024-01-02T00:00:00Z","IsDir":true},
{"Path":"notes.txt","Name":"notes.txt","Size":12,"MimeType":"text/plain","ModTime":"2024-01-03T00:00:00+02:00","IsDir":false}
]"#;

    #[test]
    fn test_parse_listing_filters_prefix_and_dirs() {
        let candidates = parse_listing(LISTING, "ipfix_").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key, "ipfix_20240101.parquet");
        assert_eq!(candidates[0].size, 2048);
        assert_eq!(
            candidates[0].last_modified.to_rfc3339(),
            "2024-01-01T10:00:00.123456789+00:00"
        );
    }

    #[test]
    fn test_parse_listing_converts_offsets() {
        let candidates = parse_listing(LISTING, "").unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].last_modified.to_rfc3339(), "2024-01-02T22:00:00+00:00");
    }

    #[test]
    fn test_parse_listing_skips_leading_noise_and_empty_output() {
        let noisy = format!("NOTICE: something\n{LISTING}");
        assert_eq!(parse_listing(&noisy, "ipfix_").unwrap().len(), 1);
        assert!(parse_listing("", "ipfix_").unwrap().is_empty());
        assert!(parse_listing("not json [", "").is_err());
    }

    #[test]
    fn test_remote_env_from_credentials() {
        let creds = ObjectStoreCredentials::new("https://minio.example.net", "AKIA", "secret")
            .with_region("us-east-1");
        let env = remote_env("minio-ipfix", &creds);
        assert_eq!(env["RCLONE_CONFIG_MINIO_IPFIX_TYPE"], "s3");
        assert_eq!(env["RCLONE_CONFIG_MINIO_IPFIX_ACCESS_KEY_ID"], "AKIA");
        assert_eq!(env["RCLONE_CONFIG_MINIO_IPFIX_ENDPOINT"], "https://minio.example.net");
        assert_eq!(env["RCLONE_CONFIG_MINIO_IPFIX_REGION"], "us-east-1");
    }

    #[test]
    fn test_commands() {
        let creds = ObjectStoreCredentials::new("http://minio:9000", "a", "s");
        let store = RcloneObjectStore::for_credentials("minio", "ipfix", &creds);
        assert_eq!(store.root(), "minio:ipfix");
        assert_eq!(
            store.list_command().to_string(),
            "rclone lsjson --recursive --files-only --quiet minio:ipfix"
        );
        assert_eq!(
            store.delete_command("ipfix_1.parquet").to_string(),
            "rclone deletefile --quiet minio:ipfix/ipfix_1.parquet"
        );
        assert_eq!(store.list_command().env.len(), 5);
    }

    #[cfg(unix)]
    fn fake_rclone(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("rclone");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_listing_ignores_stderr_noise() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_rclone(
            &dir,
            r#"echo 'NOTICE: starting' 1>&2
echo '['
echo '{"Path":"ipfix_1.parquet","Size":10,"ModTime":"2024-01-01T00:00:00Z","IsDir":false}'
echo 'ERROR : low level retry 1/10' 1>&2
echo ']'
echo 'ERROR : low level retry 2/10' 1>&2"#,
        );
        let store = RcloneObjectStore::new("minio", "ipfix").with_program(program);

        let candidates = store.list("ipfix_").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key, "ipfix_1.parquet");
        assert_eq!(candidates[0].size, 10);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_binary_is_process_error() {
        let store = RcloneObjectStore::new("minio", "ipfix").with_program("exportflow-no-rclone");
        let err = store.list("ipfix_").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
