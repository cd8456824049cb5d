use serde::Deserialize;

/// Reward signal configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewardConfig {
    /// Component weights
    #[serde(default)]
    pub weights: RewardWeights,
    /// Latency at which the latency component reaches zero, in milliseconds
    #[serde(default = "default_latency_window_ms")]
    pub latency_window_ms: u64,
    /// Reference cost (USD) used when no per-request ceiling applies
    #[serde(default = "default_cost_reference")]
    pub cost_reference: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            weights: RewardWeights::default(),
            latency_window_ms: default_latency_window_ms(),
            cost_reference: default_cost_reference(),
        }
    }
}

/// Relative weights of the reward components
///
/// Unset weights fall back to `cost = 0.5`, `latency = 0.5`, `quality = 0`.
/// Weights are normalized to sum to one before use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewardWeights {
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub latency: Option<f64>,
    #[serde(default)]
    pub quality: Option<f64>,
}

impl RewardWeights {
    /// Overlay tenant weights; set fields win
    #[must_use]
    pub fn overlay(self, tenant: Option<Self>) -> Self {
        let Some(tenant) = tenant else {
            return self;
        };
        Self {
            cost: tenant.cost.or(self.cost),
            latency: tenant.latency.or(self.latency),
            quality: tenant.quality.or(self.quality),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_latency_window_ms() -> u64 {
    30_000
}
#[allow(clippy::missing_const_for_fn)]
fn default_cost_reference() -> f64 {
    0.01
}
