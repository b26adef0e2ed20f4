//! Object-store credentials.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials for an S3-compatible object store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreCredentials {
    /// Endpoint URL including protocol, e.g. `https://s3.example.net`.
    pub endpoint_url: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Region, when the store needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl ObjectStoreCredentials {
    /// Creates credentials without a region.
    #[must_use]
    pub fn new(
        endpoint_url: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: None,
        }
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Returns the endpoint host without `http://` or `https://`.
    #[must_use]
    pub fn bare_endpoint(&self) -> String {
        self.endpoint_url
            .replace("https://", "")
            .replace("http://", "")
    }

    /// Checks that every required field is present.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (field, value) in [
            ("endpoint_url", &self.endpoint_url),
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::missing_field(field));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectStoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible: String = self.access_key.chars().take(4).collect();
        f.debug_struct("ObjectStoreCredentials")
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key", &format!("{visible}***"))
            .field("secret_key", &"***")
            .field("region", &self.region)
            .finish()
    }
}
