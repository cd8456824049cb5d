//! Request execution: offline synthesis, local-first dispatch, bounded
//! retries, and the single compressed retry after a context overflow

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tollgate_config::ExecutorConfig;
use tollgate_routing::TokenCounter;

use crate::client::{OpenAiCompatibleClient, UpstreamClient};
use crate::compress::{CompressionInfo, PromptCompressor, TruncatingCompressor};
use crate::error::LlmError;
use crate::types::{UpstreamPayload, UpstreamReply};

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Synthesized locally without a network call
    Offline,
    /// Local inference server
    Local,
    /// Aggregation API
    Upstream,
}

impl Backend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Local => "local",
            Self::Upstream => "upstream",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of executing one prompt
#[derive(Debug, Clone)]
pub struct Execution {
    pub text: String,
    pub model: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub backend: Backend,
    /// Upstream attempts, including the compressed retry
    pub attempts: u32,
    /// Present when the prompt was compressed after an overflow
    pub compression: Option<CompressionInfo>,
}

/// Result of executing a batched payload
#[derive(Debug, Clone)]
pub struct BatchReply {
    /// Choice texts by position; may be shorter than the prompts sent
    pub choices: Vec<String>,
    pub backend: Backend,
    pub attempts: u32,
}

/// Attempt bound and base delay for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Exponential delay before attempt `attempt + 1`, plus up to 50% jitter
    #[allow(clippy::cast_possible_truncation)]
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let jitter_cap = (base.as_millis() / 2) as u64;
        let jitter = if jitter_cap == 0 { 0 } else { rand::rng().random_range(0..=jitter_cap) };
        base + Duration::from_millis(jitter)
    }
}

/// Last error from a dispatch plus where it came from
struct DispatchFailure {
    error: LlmError,
    attempts: u32,
    backend: Backend,
}

struct LocalBackend {
    client: Arc<dyn UpstreamClient>,
    models: HashSet<String>,
}

/// Executes prompts against the configured backends
pub struct Executor {
    upstream: Option<Arc<dyn UpstreamClient>>,
    local: Option<LocalBackend>,
    counter: Arc<dyn TokenCounter>,
    compressor: Arc<dyn PromptCompressor>,
    retry: RetryPolicy,
    compression_target: f64,
    max_token_overrides: HashMap<String, usize>,
}

impl Executor {
    /// Executor with no backends; every request takes the offline path
    pub fn offline(counter: Arc<dyn TokenCounter>) -> Self {
        let defaults = ExecutorConfig::default();
        Self {
            upstream: None,
            local: None,
            compressor: Arc::new(TruncatingCompressor::new(Arc::clone(&counter))),
            counter,
            retry: RetryPolicy {
                max_attempts: defaults.max_attempts,
                backoff: Duration::from_millis(defaults.retry_backoff_ms),
            },
            compression_target: defaults.compression_target,
            max_token_overrides: HashMap::new(),
        }
    }

    /// Build HTTP clients for every configured backend
    pub fn from_config(config: &ExecutorConfig, counter: Arc<dyn TokenCounter>) -> Result<Self, LlmError> {
        let mut executor = Self::offline(counter)
            .with_retry(RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                backoff: Duration::from_millis(config.retry_backoff_ms),
            })
            .with_compression_target(config.compression_target)
            .with_max_token_overrides(config.max_token_overrides.clone());

        if let Some(upstream) = &config.upstream {
            executor = executor.with_upstream(Arc::new(OpenAiCompatibleClient::upstream(upstream)?));
        }
        if let Some(local) = config.local.as_ref().filter(|l| l.enabled) {
            executor = executor.with_local(Arc::new(OpenAiCompatibleClient::local(local)?), local.models.clone());
        }

        if executor.is_offline() {
            tracing::info!("no upstream or local backend configured, executor running offline");
        }

        Ok(executor)
    }

    #[must_use]
    pub fn with_upstream(mut self, client: Arc<dyn UpstreamClient>) -> Self {
        self.upstream = Some(client);
        self
    }

    #[must_use]
    pub fn with_local(mut self, client: Arc<dyn UpstreamClient>, models: impl IntoIterator<Item = String>) -> Self {
        self.local = Some(LocalBackend {
            client,
            models: models.into_iter().collect(),
        });
        self
    }

    #[must_use]
    pub fn with_compressor(mut self, compressor: Arc<dyn PromptCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_compression_target(mut self, target: f64) -> Self {
        self.compression_target = target;
        self
    }

    #[must_use]
    pub fn with_max_token_overrides(mut self, overrides: HashMap<String, usize>) -> Self {
        self.max_token_overrides = overrides;
        self
    }

    /// Whether requests are synthesized without a network call
    pub const fn is_offline(&self) -> bool {
        self.upstream.is_none() && self.local.is_none()
    }

    /// Execute one prompt
    ///
    /// A context overflow triggers exactly one retry with a compressed
    /// prompt; if that retry fails too the original overflow is returned.
    pub async fn execute(&self, model: &str, prompt: &str, provider: Option<&Value>) -> Result<Execution, LlmError> {
        if self.is_offline() {
            let text = offline_response(prompt);
            return Ok(Execution {
                input_tokens: self.counter.count(prompt, model),
                output_tokens: self.counter.count(&text, model),
                text,
                model: model.to_owned(),
                backend: Backend::Offline,
                attempts: 1,
                compression: None,
            });
        }

        let payload = UpstreamPayload::single(model, prompt).with_provider(provider.cloned());
        match self.dispatch(&payload).await {
            Ok((reply, backend, attempts)) => self.single_execution(model, prompt, reply, backend, attempts, None),
            Err(failure) if failure.error.is_context_overflow() => {
                self.retry_compressed(model, prompt, provider, failure).await
            }
            Err(failure) => Err(failure.error),
        }
    }

    /// Execute several prompts as one upstream call, one message per prompt
    ///
    /// No compressed retry is attempted for batches; the caller decides how
    /// to handle an overflow.
    pub async fn execute_batch(
        &self,
        model: &str,
        prompts: &[String],
        provider: Option<&Value>,
    ) -> Result<BatchReply, LlmError> {
        if self.is_offline() {
            return Ok(BatchReply {
                choices: prompts.iter().map(|p| offline_response(p)).collect(),
                backend: Backend::Offline,
                attempts: 1,
            });
        }

        let payload = UpstreamPayload::batch(model, prompts.iter().cloned()).with_provider(provider.cloned());
        let (reply, backend, attempts) = self.dispatch(&payload).await.map_err(|failure| failure.error)?;
        Ok(BatchReply {
            choices: reply.choices,
            backend,
            attempts,
        })
    }

    async fn retry_compressed(
        &self,
        model: &str,
        prompt: &str,
        provider: Option<&Value>,
        failure: DispatchFailure,
    ) -> Result<Execution, LlmError> {
        let DispatchFailure {
            error: overflow,
            attempts,
            backend,
        } = failure;
        let Some(client) = self.client_for(backend) else {
            return Err(overflow);
        };

        let max_tokens = self.max_token_overrides.get(model).copied();
        let compressed = match self.compressor.compress(prompt, model, self.compression_target, max_tokens) {
            Ok(compressed) => compressed,
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "could not compress prompt after context overflow");
                return Err(overflow);
            }
        };

        tracing::warn!(
            model = %model,
            original_tokens = compressed.info.original_tokens,
            compressed_tokens = compressed.info.compressed_tokens,
            "context overflow, retrying once with compressed prompt"
        );

        let payload = UpstreamPayload::single(model, compressed.text.as_str()).with_provider(provider.cloned());
        match client.send(&payload).await {
            Ok(reply) => self.single_execution(
                model,
                &compressed.text,
                reply,
                backend,
                attempts + 1,
                Some(compressed.info),
            ),
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "compressed retry failed");
                Err(overflow)
            }
        }
    }

    fn single_execution(
        &self,
        model: &str,
        prompt: &str,
        reply: UpstreamReply,
        backend: Backend,
        attempts: u32,
        compression: Option<CompressionInfo>,
    ) -> Result<Execution, LlmError> {
        let input_tokens = reply.input_tokens;
        let output_tokens = reply.output_tokens;
        let text = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_owned()))?;

        Ok(Execution {
            input_tokens: input_tokens.unwrap_or_else(|| self.counter.count(prompt, model)),
            output_tokens: output_tokens.unwrap_or_else(|| self.counter.count(&text, model)),
            text,
            model: model.to_owned(),
            backend,
            attempts,
            compression,
        })
    }

    /// Send with retries, local backend first when it serves the model
    async fn dispatch(&self, payload: &UpstreamPayload) -> Result<(UpstreamReply, Backend, u32), DispatchFailure> {
        let mut spent = 0;

        if let Some(local) = self.local_for(&payload.model) {
            match self.send_with_retry(local.client.as_ref(), payload).await {
                Ok((reply, attempts)) => return Ok((reply, Backend::Local, attempts)),
                Err((error, attempts)) => {
                    spent = attempts;
                    if self.upstream.is_none() || error.is_context_overflow() {
                        return Err(DispatchFailure {
                            error,
                            attempts,
                            backend: Backend::Local,
                        });
                    }
                    tracing::warn!(model = %payload.model, error = %error, "local backend failed, falling back to upstream");
                }
            }
        }

        let Some(upstream) = &self.upstream else {
            return Err(DispatchFailure {
                error: LlmError::Transport(format!("no backend serves model {}", payload.model)),
                attempts: spent,
                backend: Backend::Offline,
            });
        };

        match self.send_with_retry(upstream.as_ref(), payload).await {
            Ok((reply, attempts)) => Ok((reply, Backend::Upstream, spent + attempts)),
            Err((error, attempts)) => Err(DispatchFailure {
                error,
                attempts: spent + attempts,
                backend: Backend::Upstream,
            }),
        }
    }

    async fn send_with_retry(
        &self,
        client: &dyn UpstreamClient,
        payload: &UpstreamPayload,
    ) -> Result<(UpstreamReply, u32), (LlmError, u32)> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match client.send(payload).await {
                Ok(reply) => return Ok((reply, attempt)),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        backend = %client.name(),
                        model = %payload.model,
                        attempt,
                        delay = ?delay,
                        error = %err,
                        "transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err((err, attempt)),
            }
        }
    }

    /// Local backend for `model`; the only backend when no upstream is set
    fn local_for(&self, model: &str) -> Option<&LocalBackend> {
        self.local
            .as_ref()
            .filter(|local| self.upstream.is_none() || local.models.contains(model))
    }

    fn client_for(&self, backend: Backend) -> Option<&dyn UpstreamClient> {
        match backend {
            Backend::Local => self.local.as_ref().map(|local| local.client.as_ref()),
            Backend::Upstream => self.upstream.as_deref(),
            Backend::Offline => None,
        }
    }
}

/// Deterministic response built from the prompt's own sentences
///
/// The first sentence becomes the summary and every sentence is listed as
/// a detail bullet, so the output is stable for a given prompt.
pub fn offline_response(prompt: &str) -> String {
    let sentences = split_sentences(prompt);
    let Some(first) = sentences.first() else {
        return "## Summary\n(empty prompt)".to_owned();
    };

    let mut out = format!("## Summary\n{first}\n\n## Details\n");
    for sentence in &sentences {
        out.push_str("- ");
        out.push_str(sentence);
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let at_boundary = matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|(_, next)| next.is_whitespace());
        if at_boundary || c == '\n' {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}
