//! Client for the text-generation API (Gemini `generateContent` shape).
//!
//! Responses are parsed fail-fast: a missing level of `candidates[0].content.parts[0].text`
//! is an error, never a silent default. No retries.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API credential configured for the generation endpoint")]
    MissingCredential,
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("No candidates returned from generation API")]
    NoCandidates,
    #[error("No content parts returned from generation API")]
    NoContentParts,
    #[error("First content part has no text")]
    MissingText,
}

/// Explicit credentials and endpoint; nothing is read from the environment
/// unless the caller asks for [`GenerationConfig::from_env`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Full endpoint URL carrying its own `key=` parameter; used when `api_key` is unset.
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            endpoint: None,
            timeout_ms: 30_000,
        }
    }
}

impl GenerationConfig {
    /// `GEMINI_API_KEY`, `GEMINI_API_URL`, `GEMINI_MODEL`.
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|s| !s.is_empty());
        Self {
            api_key: var("GEMINI_API_KEY"),
            endpoint: var("GEMINI_API_URL"),
            model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ..Self::default()
        }
    }

    /// The URL to POST to, or `MissingCredential`.
    pub fn resolve_url(&self) -> Result<String, GenerationError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url.trim_end_matches('/'),
                self.model,
                key
            ));
        }
        match self.endpoint.as_deref() {
            Some(url) if url.contains("key=") && !url.ends_with("key=") => Ok(url.to_string()),
            _ => Err(GenerationError::MissingCredential),
        }
    }
}

/// Request body carrying a single prompt.
pub fn request_body(prompt: &str) -> Value {
    json!({ "contents": [{ "parts": [{ "text": prompt }] }] })
}

/// Pull `candidates[0].content.parts[0].text` out of a response.
pub fn extract_text(response: &Value) -> Result<String, GenerationError> {
    let candidate = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or(GenerationError::NoCandidates)?;
    let part = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .and_then(|p| p.first())
        .ok_or(GenerationError::NoContentParts)?;
    part.get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(GenerationError::MissingText)
}

#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    url: String,
}

impl GenerationClient {
    /// Fails with `MissingCredential` before any request is made.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let url = config.resolve_url()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { http, url })
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(chars = prompt.chars().count(), "sending generation request");
        let resp = self.http.post(&self.url).json(&request_body(prompt)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "generation API error");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value = resp.json().await?;
        extract_text(&value)
    }
}
