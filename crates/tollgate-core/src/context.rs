use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProviderPreferences;

/// Tenant identity a request is billed and limited against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantKey {
    /// Tenant identifier
    pub tenant: String,
    /// Optional workspace within the tenant
    pub workspace: Option<String>,
}

impl TenantKey {
    /// Key for a tenant without a workspace
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            workspace: None,
        }
    }

    /// Key for a workspace inside a tenant
    pub fn with_workspace(tenant: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            workspace: Some(workspace.into()),
        }
    }

    /// Lookup keys from most to least specific (`tenant/workspace`, then `tenant`)
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(workspace) = &self.workspace {
            keys.push(format!("{}/{workspace}", self.tenant));
        }
        keys.push(self.tenant.clone());
        keys
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.workspace {
            Some(workspace) => write!(f, "{}/{workspace}", self.tenant),
            None => f.write_str(&self.tenant),
        }
    }
}

/// A single gateway call: "produce an answer for this prompt"
///
/// Immutable once submitted; the gateway only reads it.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// Correlation id, used in logs and upstream idempotency
    pub id: Uuid,
    /// Prompt text
    pub prompt: String,
    /// Task category tag (e.g. "summarize", "code")
    pub task: String,
    /// Explicit model, bypassing the selector
    pub model_override: Option<String>,
    /// Tenant the request is billed against
    pub tenant: TenantKey,
    /// Per-request provider preference overrides
    pub provider: Option<ProviderPreferences>,
    /// Whether the caller expects a JSON document back
    pub expect_json: bool,
}

impl RouteRequest {
    /// Create a request with no overrides
    pub fn new(tenant: TenantKey, task: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            task: task.into(),
            model_override: None,
            tenant,
            provider: None,
            expect_json: false,
        }
    }

    /// Pin the request to a specific model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    /// Attach provider preference overrides
    #[must_use]
    pub fn with_provider(mut self, provider: ProviderPreferences) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Mark the response as expected to be JSON
    #[must_use]
    pub const fn expecting_json(mut self) -> Self {
        self.expect_json = true;
        self
    }
}

/// Grouping key for coalesced upstream calls
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    /// Model every member of the batch runs against
    pub model: String,
    /// Task category shared by every member
    pub task: String,
}

impl BatchKey {
    pub fn new(model: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            task: task.into(),
        }
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.task)
    }
}

/// Reward observation handed to the learning collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct RewardSample {
    /// Task category the request ran under
    pub task: String,
    /// Model that served (or failed) the request
    pub model: String,
    /// Reward in `[0, 1]`
    pub reward: f64,
}

impl RewardSample {
    /// Build a sample, clamping the reward into `[0, 1]`
    pub fn new(task: impl Into<String>, model: impl Into<String>, reward: f64) -> Self {
        let reward = if reward.is_nan() { 0.0 } else { reward.clamp(0.0, 1.0) };
        Self {
            task: task.into(),
            model: model.into(),
            reward,
        }
    }

    /// Zero-reward sample recorded for requests that failed during execution
    pub fn failure(task: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(task, model, 0.0)
    }
}
