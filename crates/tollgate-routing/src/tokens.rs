//! Prompt token counting

use std::sync::{Arc, LazyLock};

use tiktoken_rs::{CoreBPE, o200k_base};
use tollgate_config::TokenizerKind;

/// Shared BPE; `None` if the vocabulary failed to load
static O200K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| match o200k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        tracing::warn!(error = %e, "failed to load o200k tokenizer, falling back to length heuristic");
        None
    }
});

/// Counts tokens in prompt text for a given model
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str, model: &str) -> usize;
}

/// BPE token counts using the `o200k_base` vocabulary
#[derive(Debug, Default, Clone, Copy)]
pub struct TiktokenCounter;

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str, model: &str) -> usize {
        O200K
            .as_ref()
            .map_or_else(|| HeuristicCounter.count(text, model), |bpe| bpe.encode_with_special_tokens(text).len())
    }
}

/// Roughly four characters per token, never zero for non-empty text
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str, _model: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        text.chars().count().div_ceil(4)
    }
}

/// Build the counter configured for the gateway
pub fn counter_for(kind: TokenizerKind) -> Arc<dyn TokenCounter> {
    match kind {
        TokenizerKind::Tiktoken => Arc::new(TiktokenCounter),
        TokenizerKind::Heuristic => Arc::new(HeuristicCounter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_rounds_up() {
        assert_eq!(HeuristicCounter.count("", "m"), 0);
        assert_eq!(HeuristicCounter.count("abc", "m"), 1);
        assert_eq!(HeuristicCounter.count("abcdefghi", "m"), 3);
    }

    #[test]
    fn tiktoken_counts_words() {
        let tokens = TiktokenCounter.count("Summarize the quarterly report in three bullet points.", "m");
        assert!(tokens > 5 && tokens < 20, "unexpected token count {tokens}");
    }
}
