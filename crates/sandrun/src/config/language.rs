//! Per-language execution profiles

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::types::MemoryLimit;

/// Everything needed to compile and run one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Display name (e.g., "Python")
    pub name: String,

    /// Toolchain version shown to users (e.g., "3.11")
    pub version: String,

    /// Extension of the source file written to the workspace
    pub extension: Extension,

    /// Container image providing the toolchain
    pub image: String,

    /// Run phase time limit in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_memory_limit")]
    pub memory_limit: MemoryLimit,

    /// Starter code offered to users
    #[serde(default)]
    pub template: String,

    /// Present only for compiled languages
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    pub run: RunConfig,

    /// Known error patterns, first match wins
    #[serde(default)]
    pub hints: Vec<ErrorHint>,
}

impl LanguageProfile {
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Name the submitted code is saved under
    pub fn source_name(&self) -> String {
        match self.compile {
            Some(ref compile) => compile.source_name.clone(),
            None => format!("main.{}", self.extension),
        }
    }

    /// Run phase deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Compile phase deadline, defaulting to the run phase deadline
    pub fn compile_timeout(&self) -> Duration {
        self.compile
            .as_ref()
            .and_then(|compile| compile.timeout_seconds)
            .map_or_else(|| self.timeout(), Duration::from_secs)
    }

    pub fn compile_command(&self) -> Option<Vec<String>> {
        self.compile.as_ref().map(|compile| {
            Self::expand_command(&compile.command, &compile.source_name, &compile.output_name)
        })
    }

    /// Run command with `{source}` and `{binary}` filled in.
    ///
    /// For interpreted languages both refer to the source file.
    pub fn run_command(&self) -> Vec<String> {
        let (source, artifact) = match self.compile {
            Some(ref compile) => (compile.source_name.clone(), compile.output_name.clone()),
            None => {
                let source = self.source_name();
                (source.clone(), source)
            }
        };
        Self::expand_command(&self.run.command, &source, &artifact)
    }

    /// Substitute `{source}`, `{output}` and `{binary}` in every argument
    pub fn expand_command(template: &[String], source: &str, artifact: &str) -> Vec<String> {
        template
            .iter()
            .map(|arg| {
                ["{output}", "{binary}"]
                    .iter()
                    .fold(arg.replace("{source}", source), |arg, placeholder| {
                        arg.replace(placeholder, artifact)
                    })
            })
            .collect()
    }
}

/// Source file extension, without the leading dot (e.g., "cpp")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Extension(String);

impl Extension {
    pub fn new(extension: impl Into<String>) -> Result<Self, ConfigError> {
        let extension = extension.into();
        let valid = extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'));
        if !valid {
            return Err(ConfigError::InvalidExtension(extension));
        }
        Ok(Self(extension))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<String> for Extension {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Extension> for String {
    fn from(extension: Extension) -> Self {
        extension.0
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `[languages.<id>.compile]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Compiler invocation; `{source}` and `{output}` are substituted
    pub command: Vec<String>,

    /// Source file name in the workspace (e.g., "Main.java")
    pub source_name: String,

    /// Artifact the compiler leaves behind (e.g., "program")
    pub output_name: String,

    /// Falls back to the run phase limit when unset
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// `[languages.<id>.run]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Program invocation; `{source}` and `{binary}` are substituted
    pub command: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// A known error pattern and the hint shown when it matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHint {
    /// Case-insensitive substring searched for in the error output
    pub pattern: String,

    /// Beginner-friendly explanation
    pub hint: String,
}

impl ErrorHint {
    /// `error_text_lower` must already be lowercased
    pub fn matches(&self, error_text_lower: &str) -> bool {
        error_text_lower.contains(&self.pattern.to_lowercase())
    }
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_memory_limit() -> MemoryLimit {
    MemoryLimit::from_mb(256)
}
