// Chat completion client
//
// Pre-configured reqwest wrapper for OpenAI-compatible chat-completion
// endpoints. The client performs the network call and normalizes every
// failure into a ProviderError; it does not retry or classify - that is the
// resilience layer's job.

use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};
use crate::types::{ChatRequest, ChatResponse, TokenUsage};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Chat completion client for OpenAI-compatible APIs
///
/// # Example
///
/// ```ignore
/// use foundersight_llm::{ChatClient, ChatMessage, ChatRequest};
///
/// let client = ChatClient::new("your-api-key")?;
/// let request = ChatRequest::new("gpt-4o", vec![ChatMessage::user("hello")]);
/// let response = client.complete(&request).await?;
/// ```
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl ChatClient {
    /// Create a new client with the given API key
    pub fn new(api_key: impl Into<String>) -> ProviderResult<Self> {
        Self::with_base_url(api_key, DEFAULT_API_URL)
    }

    /// Create a new client with a custom completions URL
    pub fn with_base_url(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
    ) -> ProviderResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            api_url: api_url.into(),
        })
    }

    /// Get the completions URL
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Execute a non-streaming chat completion
    pub async fn complete(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::transport(format!("request timed out: {}", e))
                } else if e.is_connect() {
                    ProviderError::transport(format!("connection failed: {}", e))
                } else {
                    ProviderError::transport(format!("failed to send request: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "upstream returned non-success status");

            let mut err = ProviderError::http(status.as_u16(), body.trim());
            if let Some(wait) = retry_after {
                err = err.with_retry_after(wait);
            }
            return Err(err);
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::transport(format!("failed to parse response: {}", e)))?;

        wire.into_response()
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Parse a seconds-valued Retry-After header, if present
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl WireResponse {
    fn into_response(self) -> ProviderResult<ChatResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::transport("response contained no choices"))?;

        let usage = self
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            text: choice.message.content.unwrap_or_default(),
            model: self.model,
            finish_reason: choice.finish_reason,
            usage,
        })
    }
}
