use std::time::Duration;

use serde::Serialize;
use tollgate_core::ProviderPreferences;
use tollgate_llm::{Backend, CompressionInfo};
use tollgate_quality::QualityAssessment;
use uuid::Uuid;

/// Steps a request passes through
///
/// `Succeeded`, `Failed` and `Rejected` are terminal. `Rejected` is only
/// entered before execution starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Resolved,
    RateChecked,
    CacheChecked,
    BudgetChecked,
    Executing,
    RetriedCompressed,
    Succeeded,
    Failed,
    Rejected,
}

impl RequestState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Rejected)
    }
}

/// Cache tier that answered the request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    /// `exact` or `semantic`
    pub tier: &'static str,
    /// Similarity for semantic hits
    pub similarity: Option<f64>,
}

/// Answer to a routed request
#[derive(Debug, Clone, Serialize)]
pub struct RouteResult {
    pub request_id: Uuid,
    /// Model that produced the response
    pub model: String,
    /// Model the selector picked, when budget enforcement substituted a cheaper one
    pub downgraded_from: Option<String>,
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Cost charged against the tenant budget (USD); zero for cache hits
    pub cost: f64,
    /// Backend that produced the response; absent for cache hits
    pub backend: Option<Backend>,
    /// Effective provider preferences sent upstream
    pub provider: ProviderPreferences,
    /// Set when the response came from cache
    pub cache: Option<CacheInfo>,
    /// Similarity of a semantic match seen in shadow mode but not served
    pub shadow_similarity: Option<f64>,
    pub quality: QualityAssessment,
    /// Present when the prompt was compressed after a context overflow
    pub compression: Option<CompressionInfo>,
    /// Reward reported to the selector; absent for cache hits
    pub reward: Option<f64>,
    pub latency: Duration,
    /// Every state the request passed through, ending in a terminal one
    pub states: Vec<RequestState>,
}

impl RouteResult {
    pub fn cache_hit(&self) -> bool {
        self.cache.is_some()
    }
}
