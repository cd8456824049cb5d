//! Long-lived per-tenant admission state

use std::sync::Arc;

use dashmap::DashMap;
use tollgate_config::{BudgetConfig, RateLimitConfig};
use tollgate_core::TenantKey;
use tollgate_ratelimit::{RateLimitError, TenantLimiter};

use crate::budget::BudgetBook;

/// Rate limiters and spend ledgers keyed by tenant
///
/// Entries are created on first use from the tenant's effective limits and
/// live until [`TenantStateStore::evict`] removes them.
#[derive(Default)]
pub struct TenantStateStore {
    limiters: DashMap<TenantKey, Arc<TenantLimiter>>,
    budgets: DashMap<TenantKey, Arc<BudgetBook>>,
}

impl TenantStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limiter for `tenant`, created from `config` on first use
    pub fn limiter(&self, tenant: &TenantKey, config: &RateLimitConfig) -> Result<Arc<TenantLimiter>, RateLimitError> {
        if let Some(limiter) = self.limiters.get(tenant) {
            return Ok(Arc::clone(limiter.value()));
        }
        let limiter = self
            .limiters
            .entry(tenant.clone())
            .or_try_insert_with(|| TenantLimiter::new(config).map(Arc::new))?;
        Ok(Arc::clone(limiter.value()))
    }

    /// Spend ledger for `tenant`, created from `config` on first use
    pub fn budget(&self, tenant: &TenantKey, config: &BudgetConfig) -> Arc<BudgetBook> {
        if let Some(book) = self.budgets.get(tenant) {
            return Arc::clone(book.value());
        }
        let book = self
            .budgets
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(BudgetBook::new(config.clone())));
        Arc::clone(book.value())
    }

    /// Existing spend ledger, without creating one
    pub fn existing_budget(&self, tenant: &TenantKey) -> Option<Arc<BudgetBook>> {
        self.budgets.get(tenant).map(|book| Arc::clone(book.value()))
    }

    /// Drop all state held for `tenant`; returns whether anything was held
    ///
    /// The next request from the tenant starts with full buckets and zero spend.
    pub fn evict(&self, tenant: &TenantKey) -> bool {
        let limiter = self.limiters.remove(tenant).is_some();
        let budget = self.budgets.remove(tenant).is_some();
        if limiter || budget {
            tracing::info!(tenant = %tenant, "evicted tenant state");
        }
        limiter || budget
    }

    /// Tenants with any state held
    pub fn len(&self) -> usize {
        let budget_only = self
            .budgets
            .iter()
            .filter(|entry| !self.limiters.contains_key(entry.key()))
            .count();
        self.limiters.len() + budget_only
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty() && self.budgets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_created_lazily_and_shared() {
        let store = TenantStateStore::new();
        let tenant = TenantKey::new("acme");
        assert!(store.is_empty());

        let a = store.limiter(&tenant, &RateLimitConfig::default()).unwrap();
        let b = store.limiter(&tenant, &RateLimitConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        store.budget(&tenant, &BudgetConfig::default());
        store.budget(&TenantKey::with_workspace("acme", "research"), &BudgetConfig::default());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn eviction_resets_tenant() {
        let store = TenantStateStore::new();
        let tenant = TenantKey::new("acme");
        let config = BudgetConfig {
            total_limit: Some(1.0),
            ..BudgetConfig::default()
        };

        store.budget(&tenant, &config).try_reserve("code", 0.9).unwrap().commit();
        assert!(store.evict(&tenant));
        assert!(!store.evict(&tenant));
        assert!(store.budget(&tenant, &config).spent().abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_limits_are_reported() {
        let store = TenantStateStore::new();
        let config = RateLimitConfig {
            burst_window: "soon".to_owned(),
            ..RateLimitConfig::default()
        };
        assert!(store.limiter(&TenantKey::new("acme"), &config).is_err());
        assert!(store.is_empty());
    }
}
