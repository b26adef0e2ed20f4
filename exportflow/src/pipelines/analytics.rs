//! The analytics refresh pipeline: model build, site build, publish, then
//! cleanup of exported files.

use super::cleanup::cleanup_step;
use crate::config::{AnalyticsSettings, RetentionSettings};
use crate::errors::PipelineValidationError;
use crate::pipeline::{PipelineBuilder, PipelineExecutor, ProcessWork, Step};
use crate::process::CommandSpec;
use crate::retention::ObjectStore;
use std::sync::Arc;

/// Pipeline name.
pub const ANALYTICS_PIPELINE: &str = "ipfix-analytics";

/// Materializes the dbt models.
pub const DBT_BUILD_STEP: &str = "dbt-build";
/// Refreshes the site's source data.
pub const EVIDENCE_SOURCES_STEP: &str = "evidence-sources";
/// Builds the static site.
pub const EVIDENCE_BUILD_STEP: &str = "evidence-build";
/// Uploads the built site.
pub const PUBLISH_STEP: &str = "publish";

/// Builds the materialized models.
#[must_use]
pub fn dbt_build_command(settings: &AnalyticsSettings) -> CommandSpec {
    CommandSpec::new("dbt")
        .arg("build")
        .current_dir(settings.dbt_path())
        .with_timeout(settings.command_timeout())
}

/// Refreshes the site's source queries.
#[must_use]
pub fn evidence_sources_command(settings: &AnalyticsSettings) -> CommandSpec {
    npm_run("sources", settings)
}

/// Builds the static site.
#[must_use]
pub fn evidence_build_command(settings: &AnalyticsSettings) -> CommandSpec {
    npm_run("build", settings)
}

fn npm_run(script: &str, settings: &AnalyticsSettings) -> CommandSpec {
    CommandSpec::new("npm")
        .args(["run", script])
        .current_dir(settings.evidence_path())
        .with_timeout(settings.command_timeout())
}

/// Copies the built site to the publish target.
#[must_use]
pub fn publish_command(settings: &AnalyticsSettings) -> CommandSpec {
    CommandSpec::new("rclone")
        .args(["copy", "build/"])
        .arg(settings.publish_target.clone())
        .args(["-v", "--stats", "10s", "--checksum", "--exclude", ".DS_Store"])
        .current_dir(settings.evidence_path())
        .with_timeout(settings.command_timeout())
}

/// Options chosen per invocation rather than through the environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyticsOptions {
    /// Leave out the publish step.
    pub skip_publish: bool,
}

/// Builds the analytics pipeline.
///
/// `cleanup_store` is the bucket exported files land in; the finalizer
/// prunes it once everything else succeeded.
pub fn analytics_pipeline(
    settings: &AnalyticsSettings,
    retention: &RetentionSettings,
    cleanup_store: Arc<dyn ObjectStore>,
    options: AnalyticsOptions,
) -> Result<PipelineExecutor, PipelineValidationError> {
    let mut builder = PipelineBuilder::new(ANALYTICS_PIPELINE)
        .step(
            Step::new(DBT_BUILD_STEP, ProcessWork::new(dbt_build_command(settings)))
                .with_retries(settings.build_retries),
        )
        .step(Step::new(
            EVIDENCE_SOURCES_STEP,
            ProcessWork::new(evidence_sources_command(settings)),
        ))
        .step(Step::new(
            EVIDENCE_BUILD_STEP,
            ProcessWork::new(evidence_build_command(settings)),
        ));

    if options.skip_publish {
        tracing::info!("Publish step disabled for this run");
    } else {
        builder = builder.step(
            Step::new(PUBLISH_STEP, ProcessWork::new(publish_command(settings)))
                .with_retries(settings.publish_retries),
        );
    }

    builder.finalizer(cleanup_step(retention, cleanup_store)).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::cleanup::CLEANUP_STEP;
    use crate::testing::InMemoryObjectStore;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::time::Duration;

    fn settings() -> AnalyticsSettings {
        AnalyticsSettings {
            project_dir: PathBuf::from("/srv/ipfix"),
            command_timeout_seconds: Some(600),
            ..AnalyticsSettings::default()
        }
    }

    fn names(pipeline: &PipelineExecutor) -> Vec<&str> {
        pipeline.steps().iter().map(Step::name).collect()
    }

    #[test]
    fn test_step_order_and_retries() {
        let pipeline = analytics_pipeline(
            &settings(),
            &RetentionSettings::default(),
            Arc::new(InMemoryObjectStore::new()),
            AnalyticsOptions::default(),
        )
        .unwrap();

        assert_eq!(
            names(&pipeline),
            vec![DBT_BUILD_STEP, EVIDENCE_SOURCES_STEP, EVIDENCE_BUILD_STEP, PUBLISH_STEP]
        );
        let retries: Vec<u32> = pipeline.steps().iter().map(|s| s.retry().retries).collect();
        assert_eq!(retries, vec![2, 0, 0, 2]);
        assert_eq!(pipeline.finalizer().map(Step::name), Some(CLEANUP_STEP));
    }

    #[test]
    fn test_skip_publish() {
        let pipeline = analytics_pipeline(
            &settings(),
            &RetentionSettings::default(),
            Arc::new(InMemoryObjectStore::new()),
            AnalyticsOptions { skip_publish: true },
        )
        .unwrap();

        assert_eq!(
            names(&pipeline),
            vec![DBT_BUILD_STEP, EVIDENCE_SOURCES_STEP, EVIDENCE_BUILD_STEP]
        );
        assert!(pipeline.finalizer().is_some());
    }

    #[test]
    fn test_commands() {
        let settings = settings();

        let dbt = dbt_build_command(&settings);
        assert_eq!(dbt.to_string(), "dbt build");
        assert_eq!(dbt.working_dir, Some(PathBuf::from("/srv/ipfix/dbt")));
        assert_eq!(dbt.timeout, Some(Duration::from_secs(600)));

        assert_eq!(evidence_sources_command(&settings).to_string(), "npm run sources");
        assert_eq!(evidence_build_command(&settings).to_string(), "npm run build");

        let publish = publish_command(&settings);
        assert_eq!(
            publish.args,
            vec![
                "copy", "build/", "r2:ipfix-analytics", "-v", "--stats", "10s", "--checksum",
                "--exclude", ".DS_Store"
            ]
        );
        assert_eq!(publish.working_dir, Some(PathBuf::from("/srv/ipfix/evidence")));
    }
}
