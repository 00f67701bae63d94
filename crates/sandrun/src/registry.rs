//! Language profile registry
//!
//! The registry is built once from configuration and never mutated
//! afterwards, so lookups need no locking and the registry can be shared
//! freely behind an `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

use crate::config::{Config, ConfigError, LanguageProfile};

/// Supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LanguageId {
    Python,
    JavaScript,
    Java,
    Cpp,
    C,
    Bash,
}

impl LanguageId {
    /// Every supported language, in canonical order
    pub const ALL: [LanguageId; 6] = [
        LanguageId::Python,
        LanguageId::JavaScript,
        LanguageId::Java,
        LanguageId::Cpp,
        LanguageId::C,
        LanguageId::Bash,
    ];

    /// Canonical identifier used in configuration and requests
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageId::Python => "python",
            LanguageId::JavaScript => "javascript",
            LanguageId::Java => "java",
            LanguageId::Cpp => "cpp",
            LanguageId::C => "c",
            LanguageId::Bash => "bash",
        }
    }
}

impl FromStr for LanguageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(LanguageId::Python),
            "javascript" | "js" | "node" => Ok(LanguageId::JavaScript),
            "java" => Ok(LanguageId::Java),
            "cpp" | "c++" => Ok(LanguageId::Cpp),
            "c" => Ok(LanguageId::C),
            "bash" | "sh" => Ok(LanguageId::Bash),
            _ => Err(ValidationError::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LanguageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LanguageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&s), &"a supported language"))
    }
}

/// Request rejected before any sandbox work
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Code cannot be empty")]
    EmptyCode,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Code is too large ({size} bytes, limit {limit})")]
    CodeTooLarge { size: usize, limit: usize },

    #[error("Input is too large ({size} bytes, limit {limit})")]
    StdinTooLarge { size: usize, limit: usize },
}

/// Metadata about one language, as exposed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSummary {
    pub id: LanguageId,
    pub name: String,
    pub version: String,
    pub template: String,
    pub compiled: bool,
}

/// Collects profiles before the registry is frozen
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    profiles: BTreeMap<LanguageId, LanguageProfile>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the profile for a language
    pub fn register(mut self, id: LanguageId, profile: LanguageProfile) -> Self {
        self.profiles.insert(id, profile);
        self
    }

    pub fn build(self) -> LanguageRegistry {
        LanguageRegistry {
            profiles: self
                .profiles
                .into_iter()
                .map(|(id, profile)| (id, Arc::new(profile)))
                .collect(),
        }
    }
}

/// Immutable table of language profiles
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    profiles: BTreeMap<LanguageId, Arc<LanguageProfile>>,
}

impl LanguageRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Build the registry from the `[languages]` table of a config
    ///
    /// Keys may be aliases, but two keys naming the same language are
    /// rejected.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut entries: Vec<_> = config.languages.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut keys: BTreeMap<LanguageId, &str> = BTreeMap::new();
        let mut builder = RegistryBuilder::new();
        for (key, profile) in entries {
            let id = key
                .parse::<LanguageId>()
                .map_err(|_| ConfigError::UnknownLanguage(key.clone()))?;
            if let Some(first) = keys.insert(id, key) {
                return Err(ConfigError::DuplicateLanguage {
                    id: id.to_string(),
                    first: first.to_owned(),
                    second: key.clone(),
                });
            }
            builder = builder.register(id, profile.clone());
        }
        Ok(builder.build())
    }

    /// Look up a profile by its (possibly aliased) identifier
    pub fn resolve(&self, language: &str) -> Result<(LanguageId, Arc<LanguageProfile>), ValidationError> {
        let id: LanguageId = language.parse()?;
        self.get(id)
            .map(|profile| (id, profile))
            .ok_or_else(|| ValidationError::UnsupportedLanguage(language.to_string()))
    }

    pub fn get(&self, id: LanguageId) -> Option<Arc<LanguageProfile>> {
        self.profiles.get(&id).cloned()
    }

    /// Summaries of every registered language, sorted by id
    pub fn list(&self) -> Vec<LanguageSummary> {
        self.profiles
            .iter()
            .map(|(id, profile)| LanguageSummary {
                id: *id,
                name: profile.name.clone(),
                version: profile.version.clone(),
                template: profile.template.clone(),
                compiled: profile.is_compiled(),
            })
            .collect()
    }

    /// Starter code for a language
    pub fn template(&self, language: &str) -> Result<String, ValidationError> {
        self.resolve(language)
            .map(|(_, profile)| profile.template.clone())
    }

    pub fn ids(&self) -> impl Iterator<Item = LanguageId> + '_ {
        self.profiles.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
