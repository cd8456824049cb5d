use std::time::Duration;

use thiserror::Error;
use tollgate_llm::LlmError;
use tollgate_ratelimit::RateWindow;
use tollgate_routing::RoutingError;

use crate::RequestState;

/// Caller-facing routing errors
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Rejected by a rate limit before execution; nothing was charged
    #[error("rate limit exceeded ({window}), retry after {retry_after:?}")]
    RateLimited { window: RateWindow, retry_after: Duration },

    /// No candidate fits the remaining budget or per-request ceiling
    #[error("budget exceeded: {reason}")]
    BudgetExceeded { reason: String },

    /// Execution failed after the executor's own retries
    #[error(transparent)]
    Upstream(#[from] LlmError),

    /// No model could be chosen for the task
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Tenant configuration could not be turned into live state
    #[error("invalid tenant configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// Machine-readable error code
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Upstream(e) => e.error_type(),
            Self::Routing(_) => "routing_error",
            Self::Config(_) => "config_error",
        }
    }

    /// State the request ended in
    pub const fn terminal_state(&self) -> RequestState {
        match self {
            Self::RateLimited { .. } | Self::BudgetExceeded { .. } => RequestState::Rejected,
            Self::Upstream(_) | Self::Routing(_) | Self::Config(_) => RequestState::Failed,
        }
    }
}
