use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;
use tollgate_core::ProviderPreferences;

/// Model routing configuration shared by every tenant
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Ordered candidate models per task category
    ///
    /// Must contain a `general` entry when non-empty; unknown categories
    /// fall back to it.
    #[serde(default)]
    pub task_models: IndexMap<String, Vec<String>>,
    /// Price per 1K tokens (USD) keyed by model identifier
    #[serde(default)]
    pub prices: HashMap<String, f64>,
    /// Global per-request cost ceiling (USD)
    #[serde(default)]
    pub max_cost_per_request: Option<f64>,
    /// Default provider preferences sent upstream
    #[serde(default)]
    pub provider: ProviderPreferences,
    /// Token counting strategy
    #[serde(default)]
    pub tokenizer: TokenizerKind,
}

/// Token counting strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    /// BPE token counts via tiktoken
    #[default]
    Tiktoken,
    /// Four characters per token
    Heuristic,
}
