//! OpenAI-compatible upstream client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tollgate_config::{LocalBackendConfig, UpstreamConfig};
use url::Url;

use crate::error::{LlmError, classify_http};
use crate::types::{ChatCompletionResponse, UpstreamPayload, UpstreamReply};

/// Transport to an LLM endpoint
///
/// Implementations perform a single attempt; retries and the overflow
/// fallback live in the executor.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Send one payload and return its choices
    async fn send(&self, payload: &UpstreamPayload) -> Result<UpstreamReply, LlmError>;
}

/// Client for any endpoint speaking the `/chat/completions` protocol
pub struct OpenAiCompatibleClient {
    name: String,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        name: impl Into<String>,
        base_url: Url,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            name: name.into(),
            client,
            base_url,
            api_key,
        })
    }

    /// Client for the aggregation endpoint
    pub fn upstream(config: &UpstreamConfig) -> Result<Self, LlmError> {
        Self::new(
            "upstream",
            config.base_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Client for a local inference server
    pub fn local(config: &LocalBackendConfig) -> Result<Self, LlmError> {
        Self::new(
            "local",
            config.base_url.clone(),
            None,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl UpstreamClient for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: &UpstreamPayload) -> Result<UpstreamReply, LlmError> {
        let mut builder = self.client.post(self.completions_url()).json(payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(backend = %self.name, model = %payload.model, error = %e, "upstream request failed");
            LlmError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(backend = %self.name, model = %payload.model, status = %status, "upstream returned error");
            return Err(classify_http(status.as_u16(), body));
        }

        let wire: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {e}")))?;

        Ok(wire.into())
    }
}
