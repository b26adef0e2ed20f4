//! Script templates with literal `{{ name }}` placeholders.

use crate::config::ObjectStoreCredentials;
use crate::errors::{ConfigurationError, ExportflowError};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

/// Placeholder for the object-store host, without protocol.
pub const S3_ENDPOINT: &str = "s3_endpoint";
/// Placeholder for the destination bucket.
pub const S3_BUCKET: &str = "s3_bucket";
/// Placeholder for the object-store access key.
pub const S3_ACCESS_KEY: &str = "s3_access_key";
/// Placeholder for the object-store secret key.
pub const S3_SECRET_KEY: &str = "s3_secret_key";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
    })
}

/// Mapping from placeholder name to substitution value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVariables {
    values: BTreeMap<String, String>,
}

impl TemplateVariables {
    /// Creates an empty variable set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Builds the four object-store variables used by export scripts.
    #[must_use]
    pub fn for_object_store(credentials: &ObjectStoreCredentials, bucket: &str) -> Self {
        Self::new()
            .with(S3_ENDPOINT, credentials.bare_endpoint())
            .with(S3_BUCKET, bucket)
            .with(S3_ACCESS_KEY, credentials.access_key.clone())
            .with(S3_SECRET_KEY, credentials.secret_key.clone())
    }

    /// Returns the value for a placeholder.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns the number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A SQL script template and the values for its placeholders.
#[derive(Debug, Clone)]
pub struct SqlScript {
    template: String,
    variables: TemplateVariables,
}

impl SqlScript {
    /// Creates a script from template text.
    #[must_use]
    pub fn new(template: impl Into<String>, variables: TemplateVariables) -> Self {
        Self {
            template: template.into(),
            variables,
        }
    }

    /// Reads a script template from disk.
    pub fn from_file(path: &Path, variables: TemplateVariables) -> Result<Self, ExportflowError> {
        tracing::info!(path = %path.display(), "Reading SQL script");
        let template = std::fs::read_to_string(path)?;
        Ok(Self::new(template, variables))
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitutes every `{{ name }}` occurrence literally.
    ///
    /// Placeholders are found in the template before anything is replaced,
    /// so substituted values are inserted verbatim and never rescanned.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming every placeholder in the
    /// template that has no variable or is not in the exact `{{ name }}`
    /// form.
    pub fn render(&self) -> Result<String, ConfigurationError> {
        let mut rendered = String::with_capacity(self.template.len());
        let mut unresolved = Vec::new();
        let mut last = 0;

        for cap in placeholder_re().captures_iter(&self.template) {
            let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            rendered.push_str(&self.template[last..whole.start()]);
            let literal = format!("{{{{ {} }}}}", name.as_str());
            match self.variables.get(name.as_str()) {
                Some(value) if whole.as_str() == literal => rendered.push_str(value),
                _ => {
                    unresolved.push(name.as_str().to_string());
                    rendered.push_str(whole.as_str());
                }
            }
            last = whole.end();
        }
        rendered.push_str(&self.template[last..]);

        if !unresolved.is_empty() {
            unresolved.sort();
            unresolved.dedup();
            return Err(ConfigurationError::unresolved_placeholders(&unresolved));
        }

        tracing::debug!(variables = self.variables.len(), "Template variables substituted");
        Ok(rendered)
    }
}
