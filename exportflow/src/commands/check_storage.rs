use anyhow::{Context, Result};
use chrono::Utc;
use exportflow::pipelines::rclone_store;
use exportflow::retention::StorageListing;

/// Execute the `check-storage` command: list objects with size and age.
pub async fn execute(prefix: Option<String>) -> Result<bool> {
    let settings = super::load_settings()?;
    let prefix = prefix.unwrap_or_else(|| settings.retention.prefix.clone());
    let store = rclone_store(&settings.retention, settings.require_object_store()?);

    let listing = StorageListing::collect(&store, &prefix, Utc::now())
        .await
        .with_context(|| format!("Failed to list {}", store.root()))?;

    for object in &listing.objects {
        tracing::info!(
            key = %object.key,
            size = object.size,
            age_days = object.age_days,
            "Stored object"
        );
    }
    tracing::info!(
        location = %listing.location,
        count = listing.objects.len(),
        total_bytes = listing.total_bytes,
        "Storage check complete"
    );

    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(true)
}
