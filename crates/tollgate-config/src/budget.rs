use std::collections::HashMap;

use serde::Deserialize;

/// Cumulative spend limits (USD)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Total spend allowed across all task categories
    #[serde(default)]
    pub total_limit: Option<f64>,
    /// Spend allowed per task category
    #[serde(default)]
    pub per_task_limits: HashMap<String, f64>,
}

impl BudgetConfig {
    /// Apply a tenant override: set fields replace, per-task entries replace by key
    #[must_use]
    pub fn overlay(&self, tenant: Option<&Self>) -> Self {
        let Some(tenant) = tenant else {
            return self.clone();
        };

        let mut per_task_limits = self.per_task_limits.clone();
        for (task, limit) in &tenant.per_task_limits {
            per_task_limits.insert(task.clone(), *limit);
        }

        Self {
            total_limit: tenant.total_limit.or(self.total_limit),
            per_task_limits,
        }
    }

    /// Whether any spend limit is configured
    pub fn is_tracked(&self) -> bool {
        self.total_limit.is_some() || !self.per_task_limits.is_empty()
    }
}
