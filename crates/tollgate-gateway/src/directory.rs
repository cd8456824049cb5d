//! Tenant configuration lookup

use std::collections::HashMap;
use std::sync::Arc;

use tollgate_config::{BudgetConfig, Config, RateLimitConfig, RewardWeights, TenantConfig};
use tollgate_core::{ProviderPreferences, TenantKey};
use tollgate_routing::{CandidateMap, PriceTable};

/// Effective settings for one tenant, global defaults already merged in
#[derive(Debug, Clone)]
pub struct TenantProfile {
    pub candidates: CandidateMap,
    pub prices: PriceTable,
    pub provider: ProviderPreferences,
    /// Stricter of the global and tenant per-request ceilings
    pub max_cost_per_request: Option<f64>,
    pub budget: BudgetConfig,
    pub rate_limit: RateLimitConfig,
    pub reward_weights: RewardWeights,
}

impl TenantProfile {
    /// Global defaults with no tenant overrides
    pub fn global(config: &Config) -> Self {
        Self::with_overrides(config, None)
    }

    /// Global defaults overlaid with one tenant's overrides
    pub fn with_overrides(config: &Config, tenant: Option<&TenantConfig>) -> Self {
        let routing = &config.routing;
        let Some(tenant) = tenant else {
            return Self {
                candidates: CandidateMap::new(routing.task_models.clone()),
                prices: PriceTable::new(routing.prices.clone()),
                provider: routing.provider.clone(),
                max_cost_per_request: routing.max_cost_per_request,
                budget: config.budget.clone(),
                rate_limit: config.rate_limit.clone(),
                reward_weights: config.reward.weights,
            };
        };

        let max_cost_per_request = match (routing.max_cost_per_request, tenant.max_cost_per_request) {
            (Some(global), Some(tenant)) => Some(global.min(tenant)),
            (global, tenant) => global.or(tenant),
        };

        Self {
            candidates: CandidateMap::merged(&routing.task_models, &tenant.task_models),
            prices: PriceTable::merged(&routing.prices, &tenant.prices),
            provider: routing.provider.merged_with(&tenant.provider),
            max_cost_per_request,
            budget: config.budget.overlay(tenant.budget.as_ref()),
            rate_limit: config.rate_limit.overlay(tenant.rate_limit.as_ref()),
            reward_weights: config.reward.weights.overlay(tenant.reward_weights),
        }
    }
}

/// Supplies tenant overrides keyed by tenant and workspace
pub trait TenantDirectory: Send + Sync {
    /// Effective profile for `tenant`; unknown tenants get the global defaults
    fn profile(&self, tenant: &TenantKey) -> Arc<TenantProfile>;
}

/// Directory built once from the `[tenants]` configuration table
///
/// A `tenant/workspace` entry wins over the `tenant` entry.
pub struct StaticTenantDirectory {
    default: Arc<TenantProfile>,
    tenants: HashMap<String, Arc<TenantProfile>>,
}

impl StaticTenantDirectory {
    pub fn from_config(config: &Config) -> Self {
        let tenants = config
            .tenants
            .iter()
            .map(|(key, tenant)| (key.clone(), Arc::new(TenantProfile::with_overrides(config, Some(tenant)))))
            .collect();

        Self {
            default: Arc::new(TenantProfile::global(config)),
            tenants,
        }
    }
}

impl TenantDirectory for StaticTenantDirectory {
    fn profile(&self, tenant: &TenantKey) -> Arc<TenantProfile> {
        tenant
            .lookup_keys()
            .iter()
            .find_map(|key| self.tenants.get(key))
            .map_or_else(|| Arc::clone(&self.default), Arc::clone)
    }
}
