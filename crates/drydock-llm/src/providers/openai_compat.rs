//! Generic OpenAI-compatible chat-completion backend
//!
//! One implementation covers every HTTP-reachable backend: hosted APIs and
//! local/self-hosted endpoints alike, requiring zero or one credential.
//! Rate limits are retried honoring the server's reset hint; other 4xx
//! responses are not retried; 5xx and network failures back off with
//! jitter.

use crate::chat::{
    CompletionRequest, CompletionResponse, Message, TokenUsage, ToolCall, ToolCompletionRequest,
    ToolCompletionResponse, ToolDefinition,
};
use crate::error::{Error, Result};
use crate::provider::ModelProvider;
use crate::retry::{parse_retry_after, retry_with_backoff, RetryConfig, RetryDecision};
use crate::util::{mask_api_key, sanitize_api_error};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Configuration for an OpenAI-compatible endpoint
#[derive(Clone)]
pub struct OpenAiCompatConfig {
    /// Base URL including the API prefix (e.g. `https://api.openai.com/v1`)
    pub base_url: String,
    /// Bearer credential; `None` for unauthenticated local endpoints
    pub api_key: Option<String>,
    /// Default model when a request leaves the model empty
    pub default_model: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retry behavior for transient failures
    pub retry: RetryConfig,
}

impl fmt::Debug for OpenAiCompatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatConfig")
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &self.api_key.as_deref().map(mask_api_key),
            )
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiCompatConfig {
    /// Create a configuration for the given endpoint
    #[must_use]
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            default_model: default_model.into(),
            timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `DRYDOCK_LLM_BASE_URL`, `DRYDOCK_LLM_API_KEY` (optional), and
    /// `DRYDOCK_LLM_MODEL`.
    ///
    /// # Errors
    /// Returns [`Error::NotConfigured`] when the base URL is not set.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("DRYDOCK_LLM_BASE_URL")
            .map_err(|_| Error::NotConfigured("DRYDOCK_LLM_BASE_URL not set".to_string()))?;
        let default_model = std::env::var("DRYDOCK_LLM_MODEL").unwrap_or_default();

        Ok(Self {
            api_key: std::env::var("DRYDOCK_LLM_API_KEY").ok(),
            ..Self::new(base_url, default_model)
        })
    }

    /// Set the bearer credential
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

// Wire types for the chat-completion dialect

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

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
    message: WireChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireCalledFunction,
}

#[derive(Debug, Deserialize)]
struct WireCalledFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// Provider for any OpenAI-compatible chat-completion endpoint
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    config: OpenAiCompatConfig,
    ready: AtomicBool,
}

impl OpenAiCompatProvider {
    /// Create a new provider.
    ///
    /// # Errors
    /// Returns [`Error::Network`] if the HTTP client cannot be built.
    pub fn new(config: OpenAiCompatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            client,
            config,
            ready: AtomicBool::new(false),
        })
    }

    /// Create a provider from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiCompatConfig::from_env()?)
    }

    fn resolve_model(&self, model: &str) -> String {
        if model.is_empty() {
            self.config.default_model.clone()
        } else {
            model.to_string()
        }
    }

    /// One POST to the chat-completion endpoint, with status classification
    async fn send_once(&self, body: &WireRequest) -> Result<WireResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.config.timeout.as_millis() as u64)
            } else if e.is_connect() {
                Error::Network(format!(
                    "failed to connect to {}: is the endpoint reachable?",
                    self.config.base_url
                ))
            } else {
                Error::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            warn!(?retry_after, "rate limited by backend");
            return Err(Error::RateLimited { retry_after });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Unauthorized(format!("backend returned {status}")));
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if status.is_server_error() {
            return Err(Error::Network(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(Error::Api(sanitize_api_error(&format!(
                "HTTP {status}: {body_text}"
            ))));
        }

        serde_json::from_str(&body_text)
            .map_err(|e| Error::InvalidResponse(format!("{e}: {}", sanitize_api_error(&body_text))))
    }

    /// Send with classified retries; a reset hint wins over computed backoff
    async fn send(&self, body: WireRequest) -> Result<WireResponse> {
        let outcome = retry_with_backoff(
            &self.config.retry,
            || self.send_once(&body),
            |e: &Error| match e {
                Error::RateLimited {
                    retry_after: Some(hint),
                } => RetryDecision::RetryAfter(*hint),
                e if e.is_transient() => RetryDecision::Retry,
                _ => RetryDecision::Fatal,
            },
        )
        .await;

        match outcome {
            Ok(response) => Ok(response),
            Err(retry_err) if retry_err.attempts == 1 => Err(retry_err.last_error),
            Err(retry_err) => Err(Error::MaxRetriesExceeded {
                attempts: retry_err.attempts,
                last_error: sanitize_api_error(&retry_err.last_error.to_string()),
            }),
        }
    }

    fn first_choice(response: WireResponse) -> Result<(WireChoice, Option<TokenUsage>, String)> {
        let model = response.model.unwrap_or_default();
        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("no choices in response".to_string()))?;
        Ok((choice, usage, model))
    }
}

#[async_trait::async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<()> {
        self.test_connection().await?;
        self.ready.store(true, Ordering::SeqCst);
        debug!(base_url = %self.config.base_url, "provider initialized");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> Result<()> {
        let url = format!("{}/models", self.config.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            Error::Network(format!(
                "connectivity check against {} failed: {e}",
                self.config.base_url
            ))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Unauthorized(format!(
                "connectivity check returned {status}"
            )));
        }
        // Some self-hosted endpoints do not expose /models; any non-auth
        // HTTP response still proves the endpoint is alive.
        Ok(())
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.require_ready()?;

        let body = WireRequest {
            model: self.resolve_model(&request.model),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: None,
        };

        let (choice, usage, model) = Self::first_choice(self.send(body).await?)?;
        let content = choice.message.content.unwrap_or_default();
        if content.is_empty() {
            return Err(Error::EmptyResponse);
        }

        Ok(CompletionResponse {
            content,
            usage,
            finish_reason: choice.finish_reason,
            model,
        })
    }

    #[instrument(skip(self, request), fields(model = %request.request.model, tools = request.tools.len()))]
    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse> {
        self.require_ready()?;

        let body = WireRequest {
            model: self.resolve_model(&request.request.model),
            messages: request
                .request
                .messages
                .iter()
                .map(WireMessage::from)
                .collect(),
            max_tokens: request.request.max_tokens,
            temperature: request.request.temperature,
            tools: Some(request.tools.iter().map(WireTool::from).collect()),
        };

        let (choice, usage, model) = Self::first_choice(self.send(body).await?)?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, tc)| ToolCall {
                // Some compatible backends omit call IDs
                id: tc.id.unwrap_or_else(|| format!("call_{i}")),
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ToolCompletionResponse {
            content: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls,
            usage,
            finish_reason: choice.finish_reason,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OpenAiCompatConfig {
        OpenAiCompatConfig::new("http://localhost:8080/v1", "local-model")
            .with_api_key("sk-test-1234567890")
    }

    #[test]
    fn test_config_debug_masks_api_key() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("sk-test-1234567890"));
        assert!(rendered.contains("sk-t"));
    }

    #[test]
    fn test_wire_request_serialization() {
        let body = WireRequest {
            model: "m".to_string(),
            messages: vec![WireMessage::from(&Message::user("hi"))],
            max_tokens: Some(100),
            temperature: None,
            tools: Some(vec![WireTool::from(&ToolDefinition::new(
                "read_file",
                "Read a file",
                serde_json::json!({"type": "object"}),
            ))]),
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "read_file");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_wire_response_with_tool_calls() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "function": {"name": "list_directory", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "model": "local-model"
        });

        let parsed: WireResponse = serde_json::from_value(raw).unwrap();
        let calls = parsed.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "list_directory");
        // Missing call IDs get synthesized downstream
        assert!(calls[0].id.is_none());
    }

    #[tokio::test]
    async fn test_uninitialized_provider_rejects_completion() {
        let provider = OpenAiCompatProvider::new(config()).unwrap();
        let err = provider
            .complete(CompletionRequest::new("m").with_message(Message::user("hi")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotReady(_)));
    }

    #[test]
    fn test_resolve_model_falls_back_to_default() {
        let provider = OpenAiCompatProvider::new(config()).unwrap();
        assert_eq!(provider.resolve_model(""), "local-model");
        assert_eq!(provider.resolve_model("other"), "other");
    }
}
