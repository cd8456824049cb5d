#![allow(clippy::must_use_candidate)]

pub mod batching;
pub mod budget;
pub mod cache;
mod env;
pub mod executor;
mod loader;
pub mod quality;
pub mod rate_limit;
pub mod reward;
pub mod routing;
pub mod telemetry;
pub mod tenant;

use indexmap::IndexMap;
use serde::Deserialize;

pub use batching::*;
pub use budget::*;
pub use cache::*;
pub use executor::*;
pub use quality::*;
pub use rate_limit::*;
pub use reward::*;
pub use routing::*;
pub use telemetry::TelemetryConfig;
pub use tenant::*;

/// Top-level gateway configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Candidate models, prices, and provider preferences
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Global spend limits
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Per-tenant request rate limits
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Exact and semantic response caches
    #[serde(default)]
    pub cache: CacheConfig,
    /// Request coalescing
    #[serde(default)]
    pub batching: BatchingConfig,
    /// Upstream execution
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Reward signal fed back to the model selector
    #[serde(default)]
    pub reward: RewardConfig,
    /// Response quality scoring
    #[serde(default)]
    pub quality: QualityConfig,
    /// Tenant overrides keyed by `tenant` or `tenant/workspace`
    #[serde(default)]
    pub tenants: IndexMap<String, TenantConfig>,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
