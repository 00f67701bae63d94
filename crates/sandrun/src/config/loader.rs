//! Configuration file loading for Sandrun
//!
//! User files and `SANDRUN__*` environment variables are layered over the
//! embedded defaults and override individual keys.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, EXAMPLE_CONFIG, LanguageProfile};
use crate::registry::LanguageRegistry;

/// Prefix for environment overrides, e.g. `SANDRUN__MAX_CONCURRENT=16`
const ENV_PREFIX: &str = "SANDRUN";

impl Config {
    /// Load configuration from a file.
    ///
    /// The file is layered over the embedded defaults, so it only needs to
    /// contain the settings it changes. `SANDRUN__*` environment variables
    /// are applied last.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml))
            .add_source(File::from(path))
            .add_source(env_source())
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the embedded defaults with `SANDRUN__*` environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml))
            .add_source(env_source())
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runner cannot work with
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_output_bytes must be positive".to_string(),
            ));
        }
        if self.container.ping_timeout_ms == 0 || self.container.api_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "container ping_timeout_ms and api_timeout_ms must be positive".to_string(),
            ));
        }

        // Rejects unknown keys and aliases of an already configured language
        LanguageRegistry::from_config(self)?;

        for (id, profile) in &self.languages {
            if let Some(problem) = profile_problem(profile) {
                return Err(ConfigError::Invalid(format!("language '{id}': {problem}")));
            }
        }

        Ok(())
    }
}

/// First thing wrong with a profile, if any
fn profile_problem(profile: &LanguageProfile) -> Option<&'static str> {
    let compile = profile.compile.as_ref();
    let checks = [
        (profile.name.trim().is_empty(), "name is empty"),
        (profile.extension.is_empty(), "extension is empty"),
        (profile.image.trim().is_empty(), "container image is empty"),
        (profile.run.command.is_empty(), "run command is empty"),
        (profile.timeout_seconds == 0, "timeout_seconds must be positive"),
        (
            compile.is_some_and(|c| c.command.is_empty()),
            "compile command is empty",
        ),
        (
            compile.is_some_and(|c| c.source_name.is_empty() || c.output_name.is_empty()),
            "compile source_name and output_name are required",
        ),
        (
            compile.is_some_and(|c| c.timeout_seconds == Some(0)),
            "compile timeout_seconds must be positive",
        ),
        (
            compile
                .and_then(|c| c.timeout_seconds)
                .is_some_and(|seconds| seconds > profile.timeout_seconds),
            "compile timeout_seconds must not exceed timeout_seconds",
        ),
        (
            profile.hints.iter().any(|hint| hint.pattern.is_empty()),
            "error hint has an empty pattern",
        ),
    ];
    checks
        .into_iter()
        .find_map(|(failed, problem)| failed.then_some(problem))
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
