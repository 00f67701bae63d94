use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::config::ConfigError;

/// Memory ceiling in the notation container runtimes use (`"256m"`, `"1g"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimit {
    bytes: u64,
}

impl MemoryLimit {
    /// 1 kilobyte in bytes
    pub const KB: u64 = 1024;
    /// 1 megabyte in bytes
    pub const MB: u64 = 1024 * 1024;
    /// 1 gigabyte in bytes
    pub const GB: u64 = 1024 * 1024 * 1024;

    /// Create a limit from a raw byte count
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    /// Create a limit from a megabyte count
    pub fn from_mb(mb: u64) -> Self {
        Self {
            bytes: mb * Self::MB,
        }
    }

    /// Limit in bytes
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl FromStr for MemoryLimit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let unit_part = lower.strip_suffix('b').unwrap_or(&lower);

        let (digits, multiplier) = match unit_part.chars().last() {
            Some('k') => (&unit_part[..unit_part.len() - 1], Self::KB),
            Some('m') => (&unit_part[..unit_part.len() - 1], Self::MB),
            Some('g') => (&unit_part[..unit_part.len() - 1], Self::GB),
            _ => (unit_part, 1),
        };

        let value: u64 = digits
            .parse()
            .map_err(|_| ConfigError::InvalidMemoryLimit(s.to_string()))?;
        if value == 0 {
            return Err(ConfigError::InvalidMemoryLimit(s.to_string()));
        }

        value
            .checked_mul(multiplier)
            .map(Self::from_bytes)
            .ok_or_else(|| ConfigError::InvalidMemoryLimit(s.to_string()))
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes % Self::GB == 0 {
            write!(f, "{}g", self.bytes / Self::GB)
        } else if self.bytes % Self::MB == 0 {
            write!(f, "{}m", self.bytes / Self::MB)
        } else if self.bytes % Self::KB == 0 {
            write!(f, "{}k", self.bytes / Self::KB)
        } else {
            write!(f, "{}", self.bytes)
        }
    }
}

impl Serialize for MemoryLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MemoryLimit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a memory size such as \"256m\" or \"1g\"",
            )
        })
    }
}

/// A request to execute a piece of code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source code to run
    pub code: String,

    /// Language identifier (e.g. "python")
    pub language: String,

    /// Data piped to the program's standard input
    #[serde(default, rename = "input_data", alias = "stdin")]
    pub stdin: String,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            stdin: String::new(),
        }
    }

    /// Set the standard input
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }
}

/// Raw output of one sandboxed process, before normalization
#[derive(Debug, Clone, Default)]
pub struct RawExecutionOutcome {
    /// Exit code if the process exited on its own
    pub exit_code: Option<i32>,

    /// Captured standard output (possibly truncated)
    pub stdout: String,

    /// Captured standard error (possibly truncated)
    pub stderr: String,

    /// Wall clock time in seconds
    pub wall_time: f64,

    /// Whether the watchdog killed the process
    pub timed_out: bool,
}

impl RawExecutionOutcome {
    /// Check if the process exited cleanly within its deadline
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Which step of the pipeline decided the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Program ran and exited with code 0
    Ok,

    /// The compiler rejected the source; the program never ran
    CompileError,

    /// Program exited with a non-zero code
    RuntimeError,

    /// The watchdog terminated the compiler or the program
    Timeout,

    /// No sandbox could run the program
    SandboxError,
}

impl ExecutionStatus {
    /// Failures caused by the submitted code, which are worth explaining
    pub fn is_explainable(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::CompileError | ExecutionStatus::RuntimeError | ExecutionStatus::Timeout
        )
    }
}

/// The detailed breakdown produced by the explanation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedAnalysis {
    pub explanation: String,
    pub problem_location: String,
    pub fix: String,
    pub tip: String,
}

/// Explanation attached to a failed execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorExplanation {
    /// Locally matched hint; always present
    pub quick_hint: String,

    /// Present only when the explanation service answered
    #[serde(
        rename = "detailed_analysis",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub detailed: Option<DetailedAnalysis>,
}

/// Normalized result returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,

    /// Program standard output
    pub output: String,

    /// Standard error, compiler diagnostics, or a timeout message
    pub error: String,

    /// Seconds spent in the compile and run phases
    pub execution_time: f64,

    pub status: ExecutionStatus,

    #[serde(
        rename = "ai_explanation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub explanation: Option<ErrorExplanation>,
}

impl ExecutionResult {
    /// Build a failed result for an infrastructure problem
    pub fn sandbox_error(message: impl Into<String>, execution_time: f64) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: message.into(),
            execution_time,
            status: ExecutionStatus::SandboxError,
            explanation: None,
        }
    }
}

/// Round seconds to millisecond precision
pub(crate) fn round_seconds(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}
