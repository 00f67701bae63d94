//! Error classification and explanation
//!
//! Failed executions get a quick hint from the language profile's known error
//! patterns. When an explanation service is configured it is asked for a
//! detailed analysis as well; any failure there is logged and dropped, so the
//! quick hint is always available.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub use crate::explain::client::ChatCompletionsExplainer;
use crate::config::{ExplainerSettings, LanguageProfile};
use crate::types::{DetailedAnalysis, ErrorExplanation};

mod client;

/// Hint used when no known pattern matches
pub const FALLBACK_HINT: &str = "There's an error in your code - read the message below carefully.";

/// Hint used when the watchdog stopped the program
pub const TIMEOUT_HINT: &str = "Your program took longer than the time limit. Look for an infinite loop, \
     a loop condition that never becomes false, or an algorithm doing far more work than needed.";

/// Hint used when the watchdog stopped the compiler
pub const COMPILE_TIMEOUT_HINT: &str = "The compiler ran out of time before finishing. Very large source files \
     or heavy template and constant expressions can make compilation slow.";

/// How a failed execution ended, as far as hinting is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The compiler hit its deadline
    CompileTimeout,
    /// The program hit its deadline
    Timeout,
    /// Classified by the error text
    Error,
}

/// Errors from the explanation service
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned no content")]
    EmptyReply,

    #[error("malformed analysis: {0}")]
    Malformed(String),

    #[error("service did not answer within {0:?}")]
    Timeout(Duration),
}

/// What the explanation service is told about a failure
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationRequest<'a> {
    pub code: &'a str,
    pub language: &'a str,
    pub error_message: &'a str,
    /// Standard output produced before the failure
    pub output: &'a str,
}

/// Produces detailed analyses of failed programs
#[async_trait]
pub trait ExplanationService: Send + Sync + fmt::Debug {
    async fn analyze(
        &self,
        request: &ExplanationRequest<'_>,
    ) -> Result<DetailedAnalysis, CollaboratorError>;
}

/// Pick the first hint whose pattern occurs in the error text
pub fn quick_hint(profile: &LanguageProfile, error_text: &str, kind: FailureKind) -> String {
    match kind {
        FailureKind::CompileTimeout => return COMPILE_TIMEOUT_HINT.to_string(),
        FailureKind::Timeout => return TIMEOUT_HINT.to_string(),
        FailureKind::Error => {}
    }
    let lower = fold_quotes(&error_text.to_lowercase());
    profile
        .hints
        .iter()
        .find(|hint| hint.matches(&lower))
        .map(|hint| hint.hint.clone())
        .unwrap_or_else(|| FALLBACK_HINT.to_string())
}

/// Replace typographic quotes with ASCII ones.
///
/// gcc and g++ quote tokens with U+2018/U+2019 under a UTF-8 locale.
fn fold_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            c => c,
        })
        .collect()
}

/// Builds [`ErrorExplanation`]s for failed executions
#[derive(Debug, Clone)]
pub struct Explainer {
    service: Option<Arc<dyn ExplanationService>>,
    timeout: Duration,
}

impl Explainer {
    /// Quick hints only
    pub fn disabled() -> Self {
        Self {
            service: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn new(service: Arc<dyn ExplanationService>, timeout: Duration) -> Self {
        Self {
            service: Some(service),
            timeout,
        }
    }

    /// Build from settings.
    ///
    /// Detailed analysis is enabled only if the settings enable it and the
    /// API key variable is set.
    pub fn from_settings(settings: &ExplainerSettings) -> Result<Self, CollaboratorError> {
        if !settings.enabled {
            debug!("explainer disabled in config");
            return Ok(Self::disabled());
        }
        let api_key = match std::env::var(&settings.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                debug!(
                    var = %settings.api_key_env,
                    "no API key for explainer, using quick hints only"
                );
                return Ok(Self::disabled());
            }
        };
        let client = ChatCompletionsExplainer::new(settings, api_key)?;
        Ok(Self::new(Arc::new(client), settings.timeout()))
    }

    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    /// Explain a failed execution. Never fails.
    #[instrument(skip_all, fields(language = %profile.name, ?kind))]
    pub async fn explain(
        &self,
        profile: &LanguageProfile,
        code: &str,
        error: &str,
        output: &str,
        kind: FailureKind,
    ) -> ErrorExplanation {
        let quick_hint = quick_hint(profile, error, kind);

        let Some(ref service) = self.service else {
            return ErrorExplanation {
                quick_hint,
                detailed: None,
            };
        };

        let request = ExplanationRequest {
            code,
            language: &profile.name,
            error_message: error,
            output,
        };
        let detailed = match tokio::time::timeout(self.timeout, service.analyze(&request)).await {
            Ok(Ok(analysis)) => Some(analysis),
            Ok(Err(e)) => {
                warn!(error = %e, "explanation service failed");
                None
            }
            Err(_) => {
                warn!(error = %CollaboratorError::Timeout(self.timeout), "explanation service failed");
                None
            }
        };

        ErrorExplanation {
            quick_hint,
            detailed,
        }
    }
}
