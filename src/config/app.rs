//! Application configuration structures.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::pipeline::PipelineConfig;
use super::validation::{ConfigError, expand_env_vars};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipelines to run.
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` in store URLs are expanded from the
    /// environment before validation; an unset `${VAR}` without default is
    /// rejected.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse, expand and validate configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        for pipeline in &mut config.pipelines {
            pipeline.store = expand_env_vars(&pipeline.store).map_err(|e| {
                ConfigError::ValidationError(format!("pipeline '{}': store: {}", pipeline.name, e))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any pipeline is invalid or
    /// two pipelines share a name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipelines.is_empty() {
            return Err(ConfigError::ValidationError(
                "no pipelines configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for pipeline in &self.pipelines {
            if !names.insert(pipeline.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate pipeline name: '{}'",
                    pipeline.name
                )));
            }
            pipeline.validate()?;
        }

        Ok(())
    }

    /// Pipelines to run: all of them, or only the named ones in the given order.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for a name with no pipeline.
    pub fn select(&self, names: &[String]) -> Result<Vec<&PipelineConfig>, ConfigError> {
        if names.is_empty() {
            return Ok(self.pipelines.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.pipelines
                    .iter()
                    .find(|p| &p.name == name)
                    .ok_or_else(|| {
                        ConfigError::ValidationError(format!("unknown pipeline: '{}'", name))
                    })
            })
            .collect()
    }
}
