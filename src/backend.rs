//! Extraction backend: the seam between the pipeline and the hosted
//! completion API.
//!
//! The pipeline never talks HTTP directly — it calls
//! [`ExtractionBackend::complete`] with a system prompt, a user prompt, and
//! sampling options, and gets the raw completion text back. That keeps all
//! prompt construction and response validation out of the transport layer,
//! and lets tests inject a scripted backend instead of a live endpoint.
//!
//! [`OpenAiBackend`] is the production implementation: a thin
//! chat-completions client over `reqwest`, compatible with any endpoint that
//! speaks the OpenAI wire format (set `base_url` for proxies or alternative
//! hosts).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default API endpoint root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors from a completion request.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// 401/403 — the credential is wrong; retrying will not help.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// 429 — the endpoint asked us to back off.
    #[error("rate limited by the API")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success HTTP status.
    #[error("API error (HTTP {status}): {detail}")]
    Api { status: u16, detail: String },

    /// Connection-level failure before a status was received.
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// HTTP 200 but no completion content in the body.
    #[error("empty completion in API response")]
    EmptyResponse,
}

impl BackendError {
    /// Whether a bounded retry is worth attempting. Auth failures and
    /// malformed responses are permanent; everything else is transient.
    pub fn is_transient(&self) -> bool {
        !matches!(self, BackendError::Auth(_) | BackendError::EmptyResponse)
    }
}

/// Sampling options for one completion request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A completion endpoint the extraction stage can call.
///
/// Implementations must be `Send + Sync`; documents may be extracted
/// concurrently.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Issue one completion request and return the raw assistant text.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, BackendError>;
}

/// Resolve user-facing model aliases to API model ids.
///
/// Some environments refer to models as `chatgpt-*` while the API expects
/// `gpt-*` ids.
pub fn resolve_model_alias(requested: &str) -> String {
    let name = requested.trim();
    match name.strip_prefix("chatgpt-") {
        Some(rest) => format!("gpt-{rest}"),
        None => name.to_string(),
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

// ── Production backend ───────────────────────────────────────────────────

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiBackend {
    /// Create a backend with an explicit credential.
    ///
    /// `timeout_secs` bounds the whole request; extraction calls routinely
    /// take tens of seconds on long documents.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: resolve_model_alias(&model.into()),
            timeout_secs,
        }
    }

    /// Point at a non-default endpoint (proxy, Azure, local server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ExtractionBackend for OpenAiBackend {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system_prompt,
                },
                Message {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(self.timeout_secs)
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, "API credential rejected");
            return Err(BackendError::Auth(detail));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(BackendError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, detail = %detail, "API error");
            return Err(BackendError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| BackendError::Network(format!("invalid response body: {e}")))?;

        let content = raw
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(BackendError::EmptyResponse)?;

        debug!(model = %self.model, chars = content.len(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_alias_resolution() {
        assert_eq!(resolve_model_alias("chatgpt-4o-latest"), "gpt-4o-latest");
        assert_eq!(resolve_model_alias("gpt-4o"), "gpt-4o");
        assert_eq!(resolve_model_alias("  gpt-4o  "), "gpt-4o");
    }

    #[test]
    fn transient_classification() {
        assert!(!BackendError::Auth("bad key".into()).is_transient());
        assert!(!BackendError::EmptyResponse.is_transient());
        assert!(BackendError::RateLimited {
            retry_after_secs: Some(30)
        }
        .is_transient());
        assert!(BackendError::Timeout(120).is_transient());
        assert!(BackendError::Api {
            status: 503,
            detail: String::new()
        }
        .is_transient());
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let b = OpenAiBackend::new("k", "gpt-4o", 60).with_base_url("http://localhost:8080/v1/");
        assert_eq!(b.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn chat_request_serialises_expected_shape() {
        let req = ChatRequest {
            model: "gpt-4o",
            messages: vec![Message {
                role: "system",
                content: "be terse",
            }],
            temperature: 0.1,
            max_tokens: 8192,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["model"], "gpt-4o");
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["max_tokens"], 8192);
    }
}
