//! Async HTTP client for the Ollama chat protocol.
//!
//! Speaks `POST {endpoint}/api/chat` with `stream: false` and
//! `GET {endpoint}/api/tags` for model discovery. Requests carry a
//! per-request timeout; transport faults and 5xx replies are retried with
//! exponential backoff over the pooled connection.

use crate::error::{ClientError, EvoError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Client configuration, loadable from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the LLM endpoint (`OLLAMA_HOST`).
    pub base_url: String,
    /// Default model identifier (`OLLAMA_MODEL`).
    pub default_model: String,
    /// Per-request deadline (`OLLAMA_TIMEOUT`, seconds).
    pub timeout: Duration,
    /// Total attempts per call (`OLLAMA_MAX_RETRIES`).
    pub max_retries: u32,
    /// Base backoff; attempt n sleeps `retry_delay * n`.
    pub retry_delay: Duration,
    /// Sampling temperature used when a call does not override it.
    pub temperature: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            default_model: "llama3.2".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            temperature: 0.7,
        }
    }
}

impl ClientConfig {
    /// Read the recognized environment knobs, falling back to defaults.
    ///
    /// Unparsable numeric values are configuration errors, not silent
    /// defaults.
    pub fn from_env() -> Result<Self, EvoError> {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            if !host.is_empty() {
                config.base_url = host;
            }
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            if !model.is_empty() {
                config.default_model = model;
            }
        }
        if let Ok(timeout) = std::env::var("OLLAMA_TIMEOUT") {
            let secs: f64 = timeout
                .parse()
                .map_err(|_| EvoError::Config(format!("OLLAMA_TIMEOUT '{timeout}' is not a number")))?;
            if secs <= 0.0 {
                return Err(EvoError::Config("OLLAMA_TIMEOUT must be positive".into()));
            }
            config.timeout = Duration::from_secs_f64(secs);
        }
        if let Ok(retries) = std::env::var("OLLAMA_MAX_RETRIES") {
            config.max_retries = retries.parse().map_err(|_| {
                EvoError::Config(format!("OLLAMA_MAX_RETRIES '{retries}' is not an integer"))
            })?;
        }
        Ok(config)
    }
}

/// A successful chat completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    /// The assistant message body.
    pub content: String,
    /// Model that produced it.
    pub model: String,
    /// Prompt plus completion token count, when the server reports it.
    pub tokens_used: u64,
}

/// The client surface the evolution engine depends on. The production
/// implementation is [`OllamaClient`]; tests substitute mocks.
pub trait LlmClient: Send + Sync {
    /// One chat completion for `prompt` against `model`.
    fn chat(
        &self,
        model: &str,
        prompt: &str,
        temperature: Option<f32>,
    ) -> impl Future<Output = Result<ChatResponse, ClientError>> + Send;

    /// Names of the models installed at the endpoint.
    fn list_models(&self) -> impl Future<Output = Result<Vec<String>, ClientError>> + Send;

    /// True iff the endpoint answers its discovery route.
    fn health_check(&self) -> impl Future<Output = bool> + Send;
}

// ---- wire types ----

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatReply {
    message: Option<ReplyMessage>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    prompt_eval_count: u64,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsReply {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

/// Pooled HTTP client for an Ollama-compatible endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl OllamaClient {
    /// Build a client with a pooled connection and the configured
    /// per-request timeout.
    pub fn new(config: ClientConfig) -> Result<Self, EvoError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EvoError::Config(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn transport_error(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            ClientError::Timeout(self.config.timeout)
        } else {
            ClientError::Connection(error.to_string())
        }
    }

    async fn chat_once(
        &self,
        model: &str,
        prompt: &str,
        temperature: Option<f32>,
    ) -> Result<ChatResponse, ClientError> {
        let body = ChatRequest {
            model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: ChatOptions {
                temperature: temperature.unwrap_or(self.config.temperature),
            },
        };

        let response = self
            .http
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        let message = reply
            .message
            .ok_or_else(|| ClientError::MalformedResponse("missing message.content".into()))?;

        Ok(ChatResponse {
            content: message.content,
            model: if reply.model.is_empty() {
                model.to_string()
            } else {
                reply.model
            },
            tokens_used: reply.eval_count + reply.prompt_eval_count,
        })
    }
}

impl LlmClient for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        prompt: &str,
        temperature: Option<f32>,
    ) -> Result<ChatResponse, ClientError> {
        let mut last = ClientError::Connection("no attempt made".to_string());
        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay * attempt).await;
            }
            match self.chat_once(model, prompt, temperature).await {
                Ok(response) => {
                    debug!(model, tokens = response.tokens_used, "chat completed");
                    return Ok(response);
                }
                Err(error) => {
                    warn!(model, attempt, %error, "chat attempt failed");
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    last = error;
                }
            }
        }
        Err(last)
    }

    async fn list_models(&self) -> Result<Vec<String>, ClientError> {
        let response = self
            .http
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let tags: TagsReply = response
            .json()
            .await
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> bool {
        match self.http.get(self.url("/api/tags")).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
