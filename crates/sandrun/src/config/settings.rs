//! Backend and collaborator settings sections of the configuration file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which sandbox backend the runner uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Containers when the daemon is reachable, local processes otherwise
    #[default]
    Auto,
    /// Containers only
    Container,
    /// Local processes only
    Local,
}

/// `[container]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// Pull an image on first use instead of falling back to local execution
    #[serde(default)]
    pub pull_missing_images: bool,

    /// Maximum number of processes inside a container
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,

    /// CPU quota in cores (unlimited if not set)
    #[serde(default)]
    pub cpus: Option<f64>,

    /// Run containers as the host uid:gid so build artifacts stay removable
    #[serde(default = "default_true")]
    pub run_as_host_user: bool,

    /// Mount point of the workspace inside the container
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    /// Limit in milliseconds for the daemon ping and image lookup
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Limit in milliseconds for creating, starting, killing and removing a container
    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,

    /// Limit in seconds for pulling a missing image
    #[serde(default = "default_pull_timeout_seconds")]
    pub pull_timeout_seconds: u64,
}

impl ContainerSettings {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_seconds)
    }
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            pull_missing_images: false,
            pids_limit: default_pids_limit(),
            cpus: None,
            run_as_host_user: true,
            mount_path: default_mount_path(),
            ping_timeout_ms: default_ping_timeout_ms(),
            api_timeout_ms: default_api_timeout_ms(),
            pull_timeout_seconds: default_pull_timeout_seconds(),
        }
    }
}

/// `[local]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Apply the profile memory limit as RLIMIT_AS.
    ///
    /// Off by default: the JVM and V8 reserve far more address space than they
    /// use and refuse to start under a tight RLIMIT_AS.
    #[serde(default)]
    pub enforce_address_space_limit: bool,

    /// PATH given to local child processes
    #[serde(default = "default_local_path")]
    pub path: String,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            enforce_address_space_limit: false,
            path: default_local_path(),
        }
    }
}

/// `[explainer]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainerSettings {
    /// Ask the explanation service for detailed analysis of failures
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Chat completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_explainer_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl ExplainerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ExplainerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_explainer_timeout_ms(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_pids_limit() -> i64 {
    64
}

fn default_mount_path() -> String {
    "/code".to_owned()
}

fn default_ping_timeout_ms() -> u64 {
    2000
}

fn default_api_timeout_ms() -> u64 {
    10_000
}

fn default_pull_timeout_seconds() -> u64 {
    300
}

fn default_local_path() -> String {
    "/usr/local/bin:/usr/bin:/bin".to_owned()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_owned()
}

fn default_model() -> String {
    "gpt-4o-mini".to_owned()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_owned()
}

fn default_explainer_timeout_ms() -> u64 {
    5000
}

fn default_max_tokens() -> u32 {
    500
}
