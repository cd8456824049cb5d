//! Per-request admission, routing and feedback

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tollgate_batch::{BatchSettings, Batcher};
use tollgate_cache::{CacheHit, CacheLookup, CacheTier, CachedResponse, cache_key};
use tollgate_config::{Config, QualityConfig, RewardConfig};
use tollgate_core::{BatchKey, ProviderPreferences, RewardSample, RouteRequest, TenantKey};
use tollgate_llm::{Execution, Executor, LlmError};
use tollgate_quality::assess;
use tollgate_ratelimit::{GlobalLimiter, RateLimitError};
use tollgate_routing::{FeedbackSelector, ModelSelector, RewardModel, TokenCounter, counter_for};
use tollgate_telemetry::{MetricsSink, OtelMetrics, RequestMetrics};
use tracing::Instrument;

use crate::budget::Reservation;
use crate::directory::{StaticTenantDirectory, TenantDirectory, TenantProfile};
use crate::dispatch::{ExecutorDispatch, batch_failure};
use crate::state::TenantStateStore;
use crate::{CacheInfo, GatewayError, RequestState, RouteResult};

/// Everything resolved about a request before admission checks
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub tenant: TenantKey,
    /// Task category as submitted
    pub task: String,
    pub profile: Arc<TenantProfile>,
    /// Candidates for the task after tenant overrides
    pub candidates: Vec<String>,
    /// Model chosen by the override or the selector
    pub model: String,
    /// Effective provider preferences
    pub provider: ProviderPreferences,
    pub provider_signature: String,
}

/// Projected cost of running the prompt on the chosen model
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    pub input_tokens: usize,
    pub projected_cost: f64,
    /// Cheapest candidate fitting the current headroom and ceiling
    pub alternative: Option<String>,
}

/// Spend admitted for one request
#[derive(Debug)]
pub struct Admission {
    pub model: String,
    pub cost: f64,
    /// Originally chosen model when a cheaper candidate was substituted
    pub downgraded_from: Option<String>,
    reservation: Option<Reservation>,
}

impl Admission {
    /// Keep the reserved charge; returns the amount charged
    fn commit(self) -> f64 {
        self.reservation.map_or(self.cost, Reservation::commit)
    }
}

/// Outcome of budget enforcement
#[derive(Debug)]
pub enum BudgetDecision {
    Proceed(Admission),
    Reject { reason: String },
}

/// The admission and routing core
///
/// Owns every piece of shared per-request state: tenant limiters and
/// ledgers, caches, the batcher and the selector.
pub struct Gateway {
    directory: Arc<dyn TenantDirectory>,
    state: Arc<TenantStateStore>,
    selector: Arc<dyn ModelSelector>,
    counter: Arc<dyn TokenCounter>,
    cache: CacheTier,
    executor: Arc<Executor>,
    batcher: Option<Batcher<ExecutorDispatch>>,
    /// Provider signature batched calls are sent with
    batch_signature: String,
    global_limiter: Option<GlobalLimiter>,
    metrics: Arc<dyn MetricsSink>,
    reward: RewardConfig,
    quality: QualityConfig,
}

impl Gateway {
    /// Gateway with every collaborator built from `config`
    ///
    /// Must be called inside a Tokio runtime when a semantic cache is configured.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        GatewayBuilder::new(config).build()
    }

    pub fn builder(config: &Config) -> GatewayBuilder<'_> {
        GatewayBuilder::new(config)
    }

    /// Per-tenant limiter and ledger store
    pub fn tenant_state(&self) -> &Arc<TenantStateStore> {
        &self.state
    }

    /// Spend charged to `tenant` so far
    pub fn spent(&self, tenant: &TenantKey) -> f64 {
        self.state.existing_budget(tenant).map_or(0.0, |book| book.spent())
    }

    /// Route one request end to end
    pub async fn route(&self, request: RouteRequest) -> Result<RouteResult, GatewayError> {
        let span = tracing::info_span!(
            "route",
            request_id = %request.id,
            tenant = %request.tenant,
            task = %request.task,
        );
        self.route_inner(request).instrument(span).await
    }

    async fn route_inner(&self, request: RouteRequest) -> Result<RouteResult, GatewayError> {
        let started = Instant::now();
        let mut states = Vec::with_capacity(8);

        let ctx = self.resolve(&request)?;
        states.push(RequestState::Resolved);

        self.check_rate(&ctx)?;
        states.push(RequestState::RateChecked);

        let lookup = self.cache.lookup(&request.prompt, &ctx.model, &ctx.provider_signature).await;
        self.record_cache_lookup(&lookup);
        states.push(RequestState::CacheChecked);

        if let Some(hit) = lookup.hit {
            states.push(RequestState::Succeeded);
            return Ok(self.cached_result(&request, ctx, hit, lookup.shadow_similarity, started, states));
        }

        let estimate = self.estimate_cost(&ctx, &request.prompt);
        let admission = match self.enforce_budget(&ctx, &estimate) {
            BudgetDecision::Proceed(admission) => admission,
            BudgetDecision::Reject { reason } => {
                tracing::info!(model = %ctx.model, projected_cost = estimate.projected_cost, reason = %reason, "budget exceeded");
                self.metrics.record_rejection(&ctx.tenant.to_string(), "budget_exceeded");
                return Err(GatewayError::BudgetExceeded { reason });
            }
        };
        states.push(RequestState::BudgetChecked);

        states.push(RequestState::Executing);
        let execution = match self.execute(&request, &ctx, &admission.model).await {
            Ok(execution) => execution,
            Err(err) => {
                self.record_failure(&ctx.task, &admission.model, estimate.input_tokens, started.elapsed(), &err);
                return Err(GatewayError::Upstream(err));
            }
        };
        if execution.compression.is_some() {
            states.push(RequestState::RetriedCompressed);
        }

        let latency = started.elapsed();
        let quality = assess(&execution.text, Some(&request.prompt), self.quality.min_tokens, request.expect_json);
        let model = admission.model.clone();
        let downgraded_from = admission.downgraded_from.clone();
        let cost = admission.commit();
        let reward = self.compute_reward(&ctx.profile, cost, latency, quality.score);
        self.report_reward(&ctx.task, &model, reward);

        // The lookup key was computed for the selected model
        let key = lookup.key.map(|key| {
            if model == ctx.model {
                key
            } else {
                cache_key(&request.prompt, &model, &ctx.provider_signature)
            }
        });
        self.write_back(key.as_deref(), &request.prompt, &ctx.provider_signature, &execution)
            .await;

        self.metrics.record_request(&RequestMetrics {
            task: &ctx.task,
            model: &model,
            status: "success",
            latency,
            cost,
            input_tokens: execution.input_tokens,
            output_tokens: execution.output_tokens,
            cache_tier: None,
        });
        tracing::info!(
            model = %model,
            backend = %execution.backend,
            cost,
            reward,
            quality = quality.score,
            latency = ?latency,
            "request succeeded"
        );

        states.push(RequestState::Succeeded);
        Ok(RouteResult {
            request_id: request.id,
            model,
            downgraded_from,
            text: execution.text,
            input_tokens: execution.input_tokens,
            output_tokens: execution.output_tokens,
            cost,
            backend: Some(execution.backend),
            provider: ctx.provider,
            cache: None,
            shadow_similarity: lookup.shadow_similarity,
            quality,
            compression: execution.compression,
            reward: Some(reward),
            latency,
            states,
        })
    }

    /// Merge tenant overrides, resolve candidates and pick the model
    pub fn resolve(&self, request: &RouteRequest) -> Result<RouteContext, GatewayError> {
        let profile = self.directory.profile(&request.tenant);

        let candidates = match profile.candidates.resolve(&request.task) {
            Ok(candidates) => candidates.to_vec(),
            Err(_) if request.model_override.is_some() => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let model = match &request.model_override {
            Some(model) => model.clone(),
            None => self.selector.select(&request.task, &candidates)?,
        };
        self.metrics.record_selection(&request.task, &model);

        let provider = match &request.provider {
            Some(overrides) => profile.provider.merged_with(overrides),
            None => profile.provider.clone(),
        };
        let provider_signature = provider.signature();

        tracing::info!(
            model = %model,
            candidates = candidates.len(),
            pinned = request.model_override.is_some(),
            "resolved model"
        );

        Ok(RouteContext {
            tenant: request.tenant.clone(),
            task: request.task.clone(),
            profile,
            candidates,
            model,
            provider,
            provider_signature,
        })
    }

    /// Count prompt tokens and price them at the chosen model
    ///
    /// The alternative is the cheapest candidate that fits under both the
    /// remaining budget and the per-request ceiling right now.
    pub fn estimate_cost(&self, ctx: &RouteContext, prompt: &str) -> CostEstimate {
        let prices = &ctx.profile.prices;
        let input_tokens = self.counter.count(prompt, &ctx.model);
        let projected_cost = prices.estimate_cost(input_tokens, &ctx.model);

        let headroom = ctx
            .profile
            .budget
            .is_tracked()
            .then(|| self.state.budget(&ctx.tenant, &ctx.profile.budget).headroom(&ctx.task))
            .flatten();
        let limit = match (headroom, ctx.profile.max_cost_per_request) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let alternative = limit
            .and_then(|limit| prices.affordable_model(input_tokens, &ctx.candidates, limit))
            .map(str::to_owned);

        CostEstimate {
            input_tokens,
            projected_cost,
            alternative,
        }
    }

    /// Admit the projected cost, falling back to the affordable alternative
    ///
    /// The per-request ceiling is checked first, so a model over the ceiling
    /// never holds budget. The admitted cost is then reserved against the
    /// tenant ledger before returning, so concurrent requests cannot overspend.
    pub fn enforce_budget(&self, ctx: &RouteContext, estimate: &CostEstimate) -> BudgetDecision {
        let book = ctx
            .profile
            .budget
            .is_tracked()
            .then(|| self.state.budget(&ctx.tenant, &ctx.profile.budget));
        let ceiling = ctx.profile.max_cost_per_request;

        let alternative = estimate
            .alternative
            .as_ref()
            .filter(|alt| **alt != ctx.model)
            .map(|alt| (alt, ctx.profile.prices.estimate_cost(estimate.input_tokens, alt)));
        let attempts = std::iter::once((&ctx.model, estimate.projected_cost)).chain(alternative);

        let mut reason = None;
        for (model, cost) in attempts {
            if let Some(ceiling) = ceiling
                && cost > ceiling
            {
                reason.get_or_insert_with(|| {
                    format!("projected cost {cost:.4} exceeds per-request ceiling {ceiling:.4}")
                });
                continue;
            }

            let reservation = match &book {
                Some(book) => match book.try_reserve(&ctx.task, cost) {
                    Ok(reservation) => Some(reservation),
                    Err(breach) => {
                        reason.get_or_insert_with(|| breach.to_string());
                        continue;
                    }
                },
                None => None,
            };

            let downgraded_from = (*model != ctx.model).then(|| ctx.model.clone());
            if let Some(original) = &downgraded_from {
                tracing::info!(from = %original, to = %model, cost, "downgraded to affordable model");
            }

            return BudgetDecision::Proceed(Admission {
                model: model.clone(),
                cost,
                downgraded_from,
                reservation,
            });
        }

        BudgetDecision::Reject {
            reason: reason.unwrap_or_else(|| "no affordable model".to_owned()),
        }
    }

    /// Reward in `[0, 1]` under the tenant's weights
    pub fn compute_reward(&self, profile: &TenantProfile, cost: f64, latency: Duration, quality: f64) -> f64 {
        let max_cost = profile.max_cost_per_request.unwrap_or(self.reward.cost_reference);
        RewardModel::new(
            profile.reward_weights,
            max_cost,
            Duration::from_millis(self.reward.latency_window_ms),
        )
        .compute(cost, latency, quality)
    }

    fn check_rate(&self, ctx: &RouteContext) -> Result<(), GatewayError> {
        let limiter = self
            .state
            .limiter(&ctx.tenant, &ctx.profile.rate_limit)
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        match limiter.try_acquire(self.global_limiter.as_ref()) {
            Ok(()) => Ok(()),
            Err(RateLimitError::Exceeded { window, retry_after }) => {
                tracing::debug!(window = %window, retry_after = ?retry_after, "rate limited");
                self.metrics.record_rejection(&ctx.tenant.to_string(), "rate_limited");
                Err(GatewayError::RateLimited { window, retry_after })
            }
            Err(e @ RateLimitError::Config(_)) => Err(GatewayError::Config(e.to_string())),
        }
    }

    /// Run the prompt, through the batcher when the request can share a call
    async fn execute(&self, request: &RouteRequest, ctx: &RouteContext, model: &str) -> Result<Execution, LlmError> {
        if let Some(batcher) = &self.batcher
            && ctx.provider_signature == self.batch_signature
        {
            let choice = batcher
                .submit(BatchKey::new(model, &request.task), request.prompt.clone())
                .await
                .map_err(batch_failure)?;

            return Ok(Execution {
                input_tokens: self.counter.count(&request.prompt, model),
                output_tokens: self.counter.count(&choice.text, model),
                text: choice.text,
                model: model.to_owned(),
                backend: choice.backend,
                attempts: 1,
                compression: None,
            });
        }

        let provider = (!ctx.provider.is_empty()).then(|| ctx.provider.to_value());
        self.executor.execute(model, &request.prompt, provider.as_ref()).await
    }

    fn cached_result(
        &self,
        request: &RouteRequest,
        ctx: RouteContext,
        hit: CacheHit,
        shadow_similarity: Option<f64>,
        started: Instant,
        states: Vec<RequestState>,
    ) -> RouteResult {
        let latency = started.elapsed();
        let response = hit.response;
        let quality = assess(&response.text, Some(&request.prompt), self.quality.min_tokens, request.expect_json);

        tracing::debug!(tier = hit.tier.as_str(), model = %response.model, "served from cache");
        self.metrics.record_request(&RequestMetrics {
            task: &ctx.task,
            model: &response.model,
            status: "success",
            latency,
            cost: 0.0,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cache_tier: Some(hit.tier.as_str()),
        });

        RouteResult {
            request_id: request.id,
            model: response.model,
            downgraded_from: None,
            text: response.text,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cost: 0.0,
            backend: None,
            provider: ctx.provider,
            cache: Some(CacheInfo {
                tier: hit.tier.as_str(),
                similarity: hit.similarity,
            }),
            shadow_similarity,
            quality,
            compression: None,
            reward: None,
            latency,
            states,
        }
    }

    async fn write_back(&self, key: Option<&str>, prompt: &str, provider_signature: &str, execution: &Execution) {
        let response = CachedResponse {
            text: execution.text.clone(),
            model: execution.model.clone(),
            input_tokens: execution.input_tokens,
            output_tokens: execution.output_tokens,
        };
        self.cache.store(key, prompt, provider_signature, &response).await;
    }

    fn record_failure(&self, task: &str, model: &str, input_tokens: usize, latency: Duration, err: &LlmError) {
        tracing::warn!(model, error = %err, "request failed");
        self.report_reward(task, model, 0.0);
        self.metrics.record_request(&RequestMetrics {
            task,
            model,
            status: err.error_type(),
            latency,
            cost: 0.0,
            input_tokens,
            output_tokens: 0,
            cache_tier: None,
        });
    }

    fn record_cache_lookup(&self, lookup: &CacheLookup) {
        if !self.cache.is_enabled() {
            return;
        }
        match &lookup.hit {
            Some(hit) => self.metrics.record_cache_lookup(hit.tier.as_str(), "hit"),
            None if lookup.shadow_similarity.is_some() => self.metrics.record_cache_lookup("semantic", "shadow"),
            None => self.metrics.record_cache_lookup("all", "miss"),
        }
    }

    fn report_reward(&self, task: &str, model: &str, reward: f64) {
        let sample = RewardSample::new(task, model, reward);
        self.selector.update(&sample.task, &sample.model, sample.reward);
        self.metrics.record_reward(&sample.task, &sample.model, sample.reward);
    }
}

/// Assembles a [`Gateway`], letting callers inject any collaborator
pub struct GatewayBuilder<'a> {
    config: &'a Config,
    directory: Option<Arc<dyn TenantDirectory>>,
    state: Option<Arc<TenantStateStore>>,
    selector: Option<Arc<dyn ModelSelector>>,
    executor: Option<Executor>,
    cache: Option<CacheTier>,
    metrics: Option<Arc<dyn MetricsSink>>,
    shutdown: CancellationToken,
}

impl<'a> GatewayBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            directory: None,
            state: None,
            selector: None,
            executor: None,
            cache: None,
            metrics: None,
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    #[must_use]
    pub fn tenant_state(mut self, state: Arc<TenantStateStore>) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn selector(mut self, selector: Arc<dyn ModelSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    #[must_use]
    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: CacheTier) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Token cancelled at shutdown; stops background cache writers
    #[must_use]
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn build(self) -> anyhow::Result<Gateway> {
        let config = self.config;
        let counter = counter_for(config.routing.tokenizer);

        let executor = match self.executor {
            Some(executor) => executor,
            None => Executor::from_config(&config.executor, Arc::clone(&counter))
                .context("failed to build executor")?,
        };
        let executor = Arc::new(executor);

        let cache = match self.cache {
            Some(cache) => cache,
            None => CacheTier::from_config(&config.cache, self.shutdown.clone()).context("failed to build cache tier")?,
        };

        let global_limiter = config
            .rate_limit
            .global
            .as_ref()
            .map(GlobalLimiter::from_config)
            .transpose()
            .context("failed to build global rate limiter")?;

        let batch_provider = &config.routing.provider;
        let batcher = config.batching.enabled.then(|| {
            let provider = (!batch_provider.is_empty()).then(|| batch_provider.to_value());
            Batcher::new(
                ExecutorDispatch::new(Arc::clone(&executor), provider),
                BatchSettings::from(&config.batching),
            )
        });

        Ok(Gateway {
            directory: self
                .directory
                .unwrap_or_else(|| Arc::new(StaticTenantDirectory::from_config(config))),
            state: self.state.unwrap_or_default(),
            selector: self.selector.unwrap_or_else(|| Arc::new(FeedbackSelector::new())),
            counter,
            cache,
            executor,
            batcher,
            batch_signature: batch_provider.signature(),
            global_limiter,
            metrics: self.metrics.unwrap_or_else(|| Arc::new(OtelMetrics::new())),
            reward: config.reward.clone(),
            quality: config.quality,
        })
    }
}
