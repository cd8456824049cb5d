//! Prompt shortening used after a context overflow

use std::sync::Arc;

use serde::Serialize;
use tollgate_routing::TokenCounter;

use crate::error::LlmError;

/// Share of the word budget kept from the start of the prompt
const HEAD_SHARE: f64 = 0.7;
const ELISION: &str = "...";

/// What a compression pass did, reported back on the route result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionInfo {
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub target_tokens: usize,
    pub strategy: &'static str,
}

/// Shortened prompt plus metadata
#[derive(Debug, Clone)]
pub struct Compressed {
    pub text: String,
    pub info: CompressionInfo,
}

/// Shortens prompts that exceed a model's context window
pub trait PromptCompressor: Send + Sync {
    /// Shorten `text` by roughly `target_reduction` (0..1), or below
    /// `max_tokens` when given, whichever is smaller
    fn compress(
        &self,
        text: &str,
        model: &str,
        target_reduction: f64,
        max_tokens: Option<usize>,
    ) -> Result<Compressed, LlmError>;
}

/// Keeps the head and tail of the prompt and elides the middle
///
/// Instructions usually sit at the start of a prompt and the question at
/// the end, so both ends survive.
pub struct TruncatingCompressor {
    counter: Arc<dyn TokenCounter>,
}

impl TruncatingCompressor {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }
}

impl PromptCompressor for TruncatingCompressor {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn compress(
        &self,
        text: &str,
        model: &str,
        target_reduction: f64,
        max_tokens: Option<usize>,
    ) -> Result<Compressed, LlmError> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() < 2 {
            return Err(LlmError::Compression("prompt too short to compress".to_owned()));
        }

        let original_tokens = self.counter.count(text, model).max(1);
        let keep = (1.0 - target_reduction.clamp(0.0, 0.95)).max(0.05);
        let mut target_tokens = ((original_tokens as f64) * keep).floor().max(1.0) as usize;
        if let Some(max) = max_tokens {
            target_tokens = target_tokens.min(max.max(1));
        }

        let mut budget = (words.len() * target_tokens / original_tokens).clamp(1, words.len() - 1);
        let mut shortened = elide(&words, budget);
        let mut compressed_tokens = self.counter.count(&shortened, model);

        while compressed_tokens > target_tokens && budget > 1 {
            budget = (budget * 9 / 10).min(budget - 1).max(1);
            shortened = elide(&words, budget);
            compressed_tokens = self.counter.count(&shortened, model);
        }

        tracing::debug!(
            model = %model,
            original_tokens,
            compressed_tokens,
            target_tokens,
            "compressed prompt"
        );

        Ok(Compressed {
            text: shortened,
            info: CompressionInfo {
                original_tokens,
                compressed_tokens,
                target_tokens,
                strategy: "head_tail_truncation",
            },
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn elide(words: &[&str], budget: usize) -> String {
    let head = ((budget as f64) * HEAD_SHARE).ceil() as usize;
    let head = head.min(budget);
    let tail = budget - head;

    let mut parts: Vec<&str> = Vec::with_capacity(budget + 1);
    parts.extend_from_slice(&words[..head]);
    parts.push(ELISION);
    parts.extend_from_slice(&words[words.len() - tail..]);
    parts.join(" ")
}
