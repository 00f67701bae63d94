//! OpenAI-compatible chat completions client for error analysis

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ExplainerSettings;
use crate::explain::{CollaboratorError, ExplanationRequest, ExplanationService};
use crate::types::DetailedAnalysis;

const SYSTEM_PROMPT: &str = "You are a helpful coding tutor.";

/// Asks a chat completions endpoint to analyze a failure
#[derive(Debug, Clone)]
pub struct ChatCompletionsExplainer {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsExplainer {
    pub fn new(settings: &ExplainerSettings, api_key: String) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key,
            max_tokens: settings.max_tokens,
        })
    }
}

fn build_prompt(request: &ExplanationRequest<'_>) -> String {
    format!(
        "A student is learning {language} and encountered an error.

Code:
```
{code}
```

Error Message:
{error}

Output (if any):
{output}

Please provide:
1. A simple explanation of what went wrong (2-3 sentences, beginner-friendly)
2. The specific line or part of code causing the issue
3. A concrete fix or suggestion
4. A tip to avoid this error in the future

Keep it concise, friendly, and educational. Reply with only a JSON object with keys: explanation, problem_location, fix, tip",
        language = request.language,
        code = request.code,
        error = request.error_message,
        output = request.output,
    )
}

/// Remove a surrounding Markdown code fence, if any
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (e.g. "json") on the opening line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn field(object: &serde_json::Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Parse the model's reply into an analysis
fn parse_analysis(content: &str) -> Result<DetailedAnalysis, CollaboratorError> {
    let value: Value = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| CollaboratorError::Malformed(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(CollaboratorError::Malformed(
            "expected a JSON object".to_owned(),
        ));
    };

    let analysis = DetailedAnalysis {
        explanation: field(&object, "explanation"),
        problem_location: field(&object, "problem_location"),
        fix: field(&object, "fix"),
        tip: field(&object, "tip"),
    };
    if analysis.explanation.is_empty() {
        return Err(CollaboratorError::Malformed(
            "missing 'explanation'".to_owned(),
        ));
    }
    Ok(analysis)
}

#[async_trait]
impl ExplanationService for ChatCompletionsExplainer {
    async fn analyze(
        &self,
        request: &ExplanationRequest<'_>,
    ) -> Result<DetailedAnalysis, CollaboratorError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(request) }
            ],
            "temperature": 0.2,
            "max_tokens": self.max_tokens
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CollaboratorError::EmptyReply)?;
        debug!(len = content.len(), "received analysis");

        parse_analysis(&content)
    }
}
