//! Gateway metrics
//!
//! Recording is fire-and-forget: sinks never return errors and never block
//! the request path.

use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};

pub const SELECTION_COUNT: &str = "tollgate.selection.count";
pub const REQUEST_COUNT: &str = "tollgate.request.count";
pub const REQUEST_DURATION: &str = "tollgate.request.duration";
pub const REQUEST_COST: &str = "tollgate.request.cost";
pub const TOKEN_USAGE: &str = "tollgate.token.usage";
pub const CACHE_LOOKUP_COUNT: &str = "tollgate.cache.lookup.count";
pub const REJECTION_COUNT: &str = "tollgate.rejection.count";
pub const REWARD: &str = "tollgate.reward";

/// Outcome of one routed request
#[derive(Debug, Clone, Copy)]
pub struct RequestMetrics<'a> {
    pub task: &'a str,
    pub model: &'a str,
    /// `success` or a machine-readable error code
    pub status: &'a str,
    pub latency: Duration,
    pub cost: f64,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Cache tier that served the request, if any
    pub cache_tier: Option<&'a str>,
}

/// Receives gateway measurements
pub trait MetricsSink: Send + Sync {
    /// A model was chosen for a task
    fn record_selection(&self, task: &str, model: &str) {
        let _ = (task, model);
    }

    /// A cache tier was consulted; `result` is `hit`, `miss` or `shadow`
    fn record_cache_lookup(&self, tier: &str, result: &str) {
        let _ = (tier, result);
    }

    /// A request was rejected before execution
    fn record_rejection(&self, tenant: &str, reason: &str) {
        let _ = (tenant, reason);
    }

    /// A request finished, successfully or not
    fn record_request(&self, request: &RequestMetrics<'_>) {
        let _ = request;
    }

    /// A reward was reported to the selector
    fn record_reward(&self, task: &str, model: &str, reward: f64) {
        let _ = (task, model, reward);
    }
}

/// Discards every measurement
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// OpenTelemetry instruments on the global meter provider
pub struct OtelMetrics {
    selections: Counter<u64>,
    requests: Counter<u64>,
    duration: Histogram<f64>,
    cost: Histogram<f64>,
    tokens: Counter<u64>,
    cache_lookups: Counter<u64>,
    rejections: Counter<u64>,
    rewards: Histogram<f64>,
}

impl OtelMetrics {
    /// Instruments on the global `tollgate` meter
    pub fn new() -> Self {
        Self::from_meter(&global::meter("tollgate"))
    }

    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            selections: meter
                .u64_counter(SELECTION_COUNT)
                .with_description("Models selected per task")
                .build(),
            requests: meter
                .u64_counter(REQUEST_COUNT)
                .with_description("Routed requests by outcome")
                .build(),
            duration: meter
                .f64_histogram(REQUEST_DURATION)
                .with_description("End-to-end request latency")
                .with_unit("s")
                .build(),
            cost: meter
                .f64_histogram(REQUEST_COST)
                .with_description("Cost charged per request")
                .with_unit("USD")
                .build(),
            tokens: meter
                .u64_counter(TOKEN_USAGE)
                .with_description("Tokens processed")
                .with_unit("{token}")
                .build(),
            cache_lookups: meter
                .u64_counter(CACHE_LOOKUP_COUNT)
                .with_description("Cache lookups by tier and result")
                .build(),
            rejections: meter
                .u64_counter(REJECTION_COUNT)
                .with_description("Requests rejected before execution")
                .build(),
            rewards: meter
                .f64_histogram(REWARD)
                .with_description("Reward reported to the model selector")
                .build(),
        }
    }
}

impl Default for OtelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for OtelMetrics {
    fn record_selection(&self, task: &str, model: &str) {
        self.selections.add(
            1,
            &[KeyValue::new("task", task.to_owned()), KeyValue::new("model", model.to_owned())],
        );
    }

    fn record_cache_lookup(&self, tier: &str, result: &str) {
        self.cache_lookups.add(
            1,
            &[KeyValue::new("tier", tier.to_owned()), KeyValue::new("result", result.to_owned())],
        );
    }

    fn record_rejection(&self, tenant: &str, reason: &str) {
        self.rejections.add(
            1,
            &[KeyValue::new("tenant", tenant.to_owned()), KeyValue::new("reason", reason.to_owned())],
        );
    }

    fn record_request(&self, request: &RequestMetrics<'_>) {
        let mut attrs = vec![
            KeyValue::new("task", request.task.to_owned()),
            KeyValue::new("model", request.model.to_owned()),
            KeyValue::new("status", request.status.to_owned()),
        ];
        if let Some(tier) = request.cache_tier {
            attrs.push(KeyValue::new("cache_tier", tier.to_owned()));
        }

        self.requests.add(1, &attrs);
        self.duration.record(request.latency.as_secs_f64(), &attrs);
        self.cost.record(request.cost, &attrs);

        let model = KeyValue::new("model", request.model.to_owned());
        self.tokens.add(
            request.input_tokens as u64,
            &[model.clone(), KeyValue::new("direction", "input")],
        );
        self.tokens
            .add(request.output_tokens as u64, &[model, KeyValue::new("direction", "output")]);
    }

    fn record_reward(&self, task: &str, model: &str, reward: f64) {
        self.rewards.record(
            reward,
            &[KeyValue::new("task", task.to_owned()), KeyValue::new("model", model.to_owned())],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_provider_is_harmless() {
        let metrics = OtelMetrics::from_meter(&global::meter("tollgate-test"));
        metrics.record_selection("code", "gpt-4o-mini");
        metrics.record_cache_lookup("exact", "hit");
        metrics.record_request(&RequestMetrics {
            task: "code",
            model: "gpt-4o-mini",
            status: "success",
            latency: Duration::from_millis(120),
            cost: 0.002,
            input_tokens: 40,
            output_tokens: 80,
            cache_tier: None,
        });
        metrics.record_reward("code", "gpt-4o-mini", 0.7);
        NoopMetrics.record_rejection("acme", "rate_limited");
    }
}
