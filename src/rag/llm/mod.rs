//! Language model client: provider abstraction, timeout, and retry policy.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{LlmConfig, ProviderKind};
use crate::error::RagError;

mod anthropic;
mod gemini;
pub mod mock;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Failure of a single provider call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Rate limits, server errors, timeouts, dropped connections.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Bad credentials, malformed requests, unparseable responses.
    #[error("provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// Classify a non-success HTTP status.
    pub fn from_status(provider: &str, status: StatusCode, body: &str) -> Self {
        let message = format!("{provider} returned {status}: {}", body.trim());
        if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            Self::Transient(message)
        } else {
            Self::Fatal(message)
        }
    }

    /// Classify a transport-level failure.
    pub fn from_reqwest(provider: &str, err: &reqwest::Error) -> Self {
        let message = format!("{provider} request failed: {err}");
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient(message)
        } else if let Some(status) = err.status() {
            Self::from_status(provider, status, &err.to_string())
        } else {
            Self::Fatal(message)
        }
    }
}

/// A hosted model that turns a prompt into an answer.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// One request/response round trip, no retries.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Exponential backoff for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// Delay before retry number `retry` (1-based): `initial * 2^(retry - 1)`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// A completed generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    pub answer: String,
    /// Wall time across all attempts, backoff included.
    pub raw_latency_ms: f64,
    pub attempts: u32,
}

/// Calls a provider with a per-attempt timeout and retries transient failures.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            provider,
            retry,
            timeout,
        }
    }

    /// Build the configured provider. The API key is read from the
    /// environment variable named by `api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, RagError> {
        let provider = build_provider(config)?;
        Ok(Self::new(
            provider,
            RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.initial_backoff_ms),
            ),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Send the prompt and return the model's answer.
    pub async fn generate_response(&self, prompt: &str) -> Result<Generation, RagError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            debug!(provider = self.provider.name(), attempt = attempts, "calling model");

            let outcome = match tokio::time::timeout(self.timeout, self.provider.complete(prompt))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Transient(format!(
                    "{} did not answer within {:?}",
                    self.provider.name(),
                    self.timeout
                ))),
            };

            match outcome {
                Ok(answer) => {
                    let raw_latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    info!(
                        "Generated answer with {} in {:.0} ms ({} attempt(s))",
                        self.provider.name(),
                        raw_latency_ms,
                        attempts
                    );
                    return Ok(Generation {
                        answer,
                        raw_latency_ms,
                        attempts,
                    });
                }
                Err(ProviderError::Fatal(message)) => {
                    return Err(RagError::Generation {
                        retryable: false,
                        attempts,
                        message,
                    });
                }
                Err(ProviderError::Transient(message)) => {
                    if attempts > self.retry.max_retries {
                        return Err(RagError::Generation {
                            retryable: true,
                            attempts,
                            message,
                        });
                    }
                    let delay = self.retry.delay_for(attempts);
                    warn!("{message}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, RagError> {
    let api_key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            RagError::Configuration(format!(
                "API key not set: export {} to use the {:?} provider",
                config.api_key_env, config.provider
            ))
        })?;

    let provider: Arc<dyn LlmProvider> = match config.provider {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(api_key, config)?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(api_key, config)?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(api_key, config)?),
    };
    Ok(provider)
}

/// HTTP client shared by the providers.
pub(crate) fn http_client(config: &LlmConfig) -> Result<reqwest::Client, RagError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Turn a non-success response into a classified error.
pub(crate) async fn error_from_response(provider: &str, resp: reqwest::Response) -> ProviderError {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    ProviderError::from_status(provider, status, &body)
}

/// Read a success body and decode it. Failures while the body is still
/// arriving (timeouts, dropped connections) are transient; a complete body
/// that does not decode is fatal.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &str,
    resp: reqwest::Response,
) -> Result<T, ProviderError> {
    let body = resp.bytes().await.map_err(|e| {
        ProviderError::Transient(format!("{provider} response body failed: {e}"))
    })?;
    serde_json::from_slice(&body)
        .map_err(|e| ProviderError::Fatal(format!("failed to parse {provider} response: {e}")))
}
