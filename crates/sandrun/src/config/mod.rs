use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    CompileConfig, ErrorHint, Extension, LanguageProfile, RunConfig,
};
pub use crate::config::settings::{
    BackendMode, ContainerSettings, ExplainerSettings, LocalSettings,
};

pub mod language;
mod loader;
mod settings;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../sandrun.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid source extension '{0}' (letters, digits, '_', '+' and '-' only)")]
    InvalidExtension(String),

    #[error("invalid memory limit '{0}' (expected e.g. \"256m\" or \"1g\")")]
    InvalidMemoryLimit(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("unknown language id '{0}' in configuration")]
    UnknownLanguage(String),

    #[error("languages '{first}' and '{second}' both configure {id}")]
    DuplicateLanguage {
        id: String,
        first: String,
        second: String,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Sandrun
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend selection policy
    #[serde(default)]
    pub backend: BackendMode,

    /// Run on the host when containers are unavailable.
    ///
    /// Local execution has no network isolation and only best-effort memory
    /// limits. Disable this wherever submitted code may be hostile.
    #[serde(default = "default_true")]
    pub allow_local_fallback: bool,

    /// Maximum number of executions in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// How long a request may wait for a free slot before it is rejected
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,

    /// Parent directory for per-request workspaces (system temp dir if not set)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Per-stream cap on captured stdout/stderr
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    #[serde(default = "default_max_input_bytes")]
    pub max_source_bytes: usize,

    #[serde(default = "default_max_input_bytes")]
    pub max_stdin_bytes: usize,

    #[serde(default)]
    pub container: ContainerSettings,

    #[serde(default)]
    pub local: LocalSettings,

    #[serde(default)]
    pub explainer: ExplainerSettings,

    /// Language profiles keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, LanguageProfile>,
}

impl Config {
    /// Embedded defaults, including every built-in language
    pub fn new() -> Self {
        Self::default()
    }

    /// Default settings without any language profiles
    pub fn empty() -> Self {
        Self {
            backend: BackendMode::default(),
            allow_local_fallback: true,
            max_concurrent: default_max_concurrent(),
            queue_timeout_ms: default_queue_timeout_ms(),
            workspace_root: None,
            max_output_bytes: default_max_output_bytes(),
            max_source_bytes: default_max_input_bytes(),
            max_stdin_bytes: default_max_input_bytes(),
            container: ContainerSettings::default(),
            local: LocalSettings::default(),
            explainer: ExplainerSettings::default(),
            languages: HashMap::new(),
        }
    }

    /// Get a language by ID
    pub fn get_language(&self, id: &str) -> Result<&LanguageProfile, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Directory that per-request workspaces are created in
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    8
}

fn default_queue_timeout_ms() -> u64 {
    2000
}

fn default_max_output_bytes() -> usize {
    100 * 1024
}

fn default_max_input_bytes() -> usize {
    1024 * 1024
}
