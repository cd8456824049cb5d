use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;
use tollgate_core::ProviderPreferences;

use crate::{BudgetConfig, RateLimitOverride, RewardWeights};

/// Per-tenant overrides
///
/// Every field is optional. Candidate lists replace the global list for the
/// same task; a `default` entry seeds any task the tenant does not list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    /// Candidate models per task category
    #[serde(default)]
    pub task_models: IndexMap<String, Vec<String>>,
    /// Price overrides per 1K tokens (USD)
    #[serde(default)]
    pub prices: HashMap<String, f64>,
    /// Provider preference overrides
    #[serde(default)]
    pub provider: ProviderPreferences,
    /// Per-request cost ceiling; the stricter of this and the global one applies
    #[serde(default)]
    pub max_cost_per_request: Option<f64>,
    /// Spend limits
    #[serde(default)]
    pub budget: Option<BudgetConfig>,
    /// Rate limit overrides
    #[serde(default)]
    pub rate_limit: Option<RateLimitOverride>,
    /// Reward weight overrides
    #[serde(default)]
    pub reward_weights: Option<RewardWeights>,
}
