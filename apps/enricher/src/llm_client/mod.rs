//! LLM Client: the single point of entry for all Claude API calls.
//!
//! No other module talks to the Anthropic API directly. Enrichment depends on
//! the `ContentGenerator` trait so the orchestrator can be driven by a scripted
//! generator in tests; the HTTP side sits behind `MessagesTransport` so the
//! retry loop can be exercised the same way.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod credentials;
pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Model used when neither the caller nor the environment picks one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
/// Retries beyond the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
const THINKING_MAX_TOKENS: u32 = 16_000;
const THINKING_BUDGET_TOKENS: u32 = 5_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Stable, serializable label for a per-field failure: every `LlmError`
/// variant plus an unregistered prompt key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    RateLimited,
    ServerError,
    EmptyResponse,
    Transport,
    Api,
    MaxRetries,
    UnknownPromptKey,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::EmptyResponse => "empty_response",
            ErrorKind::Transport => "transport",
            ErrorKind::Api => "api",
            ErrorKind::MaxRetries => "max_retries",
            ErrorKind::UnknownPromptKey => "unknown_prompt_key",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing, invalid or unauthorised credential.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited (status 429): {0}")]
    RateLimited(String),

    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// The provider answered but no content block carried text.
    #[error("Empty response from API")]
    EmptyResponse,

    /// Connection failure, timeout or undecodable body.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Any other rejected request (bad model name, malformed payload).
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed after {attempts} attempts: {last}")]
    MaxRetries { attempts: u32, last: String },
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Transport(e.to_string())
    }
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Auth(_) => ErrorKind::Auth,
            LlmError::RateLimited(_) => ErrorKind::RateLimited,
            LlmError::Server { .. } => ErrorKind::ServerError,
            LlmError::EmptyResponse => ErrorKind::EmptyResponse,
            LlmError::Transport(_) => ErrorKind::Transport,
            LlmError::Api { .. } => ErrorKind::Api,
            LlmError::MaxRetries { .. } => ErrorKind::MaxRetries,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_)
                | LlmError::Server { .. }
                | LlmError::EmptyResponse
                | LlmError::Transport(_)
        )
    }

    /// Configuration-class failures that would repeat for every field of a
    /// run (bad credentials, rejected model or payload).
    pub fn is_fatal(&self) -> bool {
        matches!(self, LlmError::Auth(_) | LlmError::Api { .. })
    }

    /// Delay before the attempt following `attempt` (zero-based).
    /// `None` for errors that are never retried.
    ///
    /// Rate limits back off as `2^(attempt+1)` seconds, server errors as
    /// `2*(attempt+1)` seconds, everything else retryable waits one second.
    pub fn backoff(&self, attempt: u32) -> Option<Duration> {
        match self {
            LlmError::RateLimited(_) => {
                Some(Duration::from_secs(2u64.saturating_pow(attempt + 1)))
            }
            LlmError::Server { .. } => Some(Duration::from_secs(2 * (u64::from(attempt) + 1))),
            LlmError::EmptyResponse | LlmError::Transport(_) => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    /// Classifies a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<AnthropicError>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string());

        match status {
            401 | 403 => LlmError::Auth(format!("Invalid API key ({message})")),
            429 => LlmError::RateLimited(message),
            500..=599 => LlmError::Server { status, message },
            _ => LlmError::Api { status, message },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub mode: String,
    pub budget_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text of the first text block, skipping thinking blocks
    /// and blocks whose text is blank.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .find(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Seams
// ────────────────────────────────────────────────────────────────────────────

/// Anything that can turn a prompt into field text.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}

/// One round trip to the Messages API. Implementations classify failures;
/// retrying is the client's job.
#[async_trait]
pub trait MessagesTransport: Send + Sync {
    async fn send(&self, request: &MessagesRequest) -> Result<LlmResponse, LlmError>;
}

/// reqwest-backed transport for the Anthropic Messages API.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: ANTHROPIC_API_URL.to_string(),
        })
    }
}

#[async_trait]
impl MessagesTransport for HttpTransport {
    async fn send(&self, request: &MessagesRequest) -> Result<LlmResponse, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("LLM API returned {}: {}", status, body);
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        Ok(response.json::<LlmResponse>().await?)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Caller-facing knobs for building an `LlmClient`.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_retries: Option<u32>,
    /// Overrides `./llm-config.json` as the last credential source.
    pub config_path: Option<PathBuf>,
    pub use_thinking: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            max_retries: None,
            config_path: None,
            use_thinking: true,
        }
    }
}

/// Wraps the Messages API with bounded retries and class-specific backoff.
#[derive(Debug, Clone)]
pub struct LlmClient<T = HttpTransport> {
    transport: T,
    model: String,
    max_retries: u32,
    use_thinking: bool,
}

impl LlmClient<HttpTransport> {
    /// Resolves credentials and builds an HTTP-backed client.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let api_key = credentials::resolve_api_key(
            settings.api_key.as_deref(),
            settings.config_path.as_deref(),
        )?;
        let mut client = Self::with_transport(HttpTransport::new(api_key)?)
            .with_thinking(settings.use_thinking);
        if let Some(model) = settings.model.as_deref().filter(|m| !m.is_empty()) {
            client = client.with_model(model);
        }
        if let Some(retries) = settings.max_retries {
            client = client.with_max_retries(retries);
        }
        Ok(client)
    }
}

impl<T: MessagesTransport> LlmClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            model: DEFAULT_MODEL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            use_thinking: true,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_thinking(mut self, use_thinking: bool) -> Self {
        self.use_thinking = use_thinking;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn thinking_enabled(&self) -> bool {
        self.use_thinking && self.model.contains("opus")
    }

    /// Opus models run with extended thinking: the system prompt moves into
    /// the user turn and the token ceiling is raised to cover the thinking
    /// budget.
    fn build_request(&self, prompt: &str, system_prompt: &str, max_tokens: u32) -> MessagesRequest {
        if self.thinking_enabled() {
            MessagesRequest {
                model: self.model.clone(),
                max_tokens: THINKING_MAX_TOKENS,
                system: None,
                messages: vec![Message {
                    role: "user".to_string(),
                    content: format!("{system_prompt}\n\n{prompt}"),
                }],
                thinking: Some(ThinkingConfig {
                    mode: "enabled".to_string(),
                    budget_tokens: THINKING_BUDGET_TOKENS,
                }),
            }
        } else {
            MessagesRequest {
                model: self.model.clone(),
                max_tokens,
                system: Some(system_prompt.to_string()),
                messages: vec![Message {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                }],
                thinking: None,
            }
        }
    }

    /// Issues one generation request, retrying retryable failures up to
    /// `max_retries` times. Non-retryable failures return immediately.
    pub async fn call(
        &self,
        prompt: &str,
        system_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let request = self.build_request(prompt, system_prompt, max_tokens);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {}/{}", attempt, self.max_retries);
            }

            let error = match self.transport.send(&request).await {
                Ok(response) => match response.text() {
                    Some(text) => {
                        if let Some(usage) = &response.usage {
                            debug!(
                                "LLM call succeeded: input_tokens={}, output_tokens={}",
                                usage.input_tokens, usage.output_tokens
                            );
                        }
                        return Ok(text.to_string());
                    }
                    None => LlmError::EmptyResponse,
                },
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if attempt < self.max_retries {
                if let Some(delay) = error.backoff(attempt) {
                    warn!(
                        "LLM call attempt {} failed ({}), retrying after {}ms...",
                        attempt + 1,
                        error.kind(),
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            last_error = Some(error);
        }

        Err(LlmError::MaxRetries {
            attempts: self.max_retries + 1,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

#[async_trait]
impl<T: MessagesTransport> ContentGenerator for LlmClient<T> {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        self.call(prompt, system_prompt, max_tokens).await
    }
}
