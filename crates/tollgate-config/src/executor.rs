use std::collections::HashMap;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Upstream execution configuration
///
/// With neither `upstream` nor `local` configured the executor runs in
/// offline mode and synthesizes deterministic responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// OpenAI-compatible aggregator endpoint
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
    /// Local inference backend tried first for the models it serves
    #[serde(default)]
    pub local: Option<LocalBackendConfig>,
    /// Attempts per request for transient failures
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Fraction of the prompt kept when retrying after a context overflow
    #[serde(default = "default_compression_target")]
    pub compression_target: f64,
    /// Per-model token ceilings the compressor fits the prompt under
    #[serde(default)]
    pub max_token_overrides: HashMap<String, usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            upstream: None,
            local: None,
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            compression_target: default_compression_target(),
            max_token_overrides: HashMap::new(),
        }
    }
}

impl ExecutorConfig {
    /// Whether no remote or local backend is configured
    pub fn is_offline(&self) -> bool {
        self.upstream.is_none() && self.local.as_ref().is_none_or(|l| !l.enabled)
    }
}

/// OpenAI-compatible upstream endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `https://openrouter.ai/api/v1`
    pub base_url: Url,
    /// Bearer token
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Local inference backend (Ollama, vLLM, ...)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalBackendConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// OpenAI-compatible base URL of the local server
    pub base_url: Url,
    /// Models served locally
    #[serde(default)]
    pub models: Vec<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_attempts() -> u32 {
    3
}
#[allow(clippy::missing_const_for_fn)]
fn default_retry_backoff_ms() -> u64 {
    200
}
#[allow(clippy::missing_const_for_fn)]
fn default_compression_target() -> f64 {
    0.5
}
#[allow(clippy::missing_const_for_fn)]
fn default_timeout_secs() -> u64 {
    60
}
#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}
