//! Reward signal fed back to the model selector

use std::time::Duration;

use tollgate_config::RewardWeights;

const DEFAULT_COST_WEIGHT: f64 = 0.5;
const DEFAULT_LATENCY_WEIGHT: f64 = 0.5;

/// Reward computation for one tenant
///
/// `reward = w_cost * (1 - cost_norm) + w_latency * (1 - latency_norm) + w_quality * quality`
/// with weights normalized to sum to one and every normalized input capped at 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardModel {
    cost_weight: f64,
    latency_weight: f64,
    quality_weight: f64,
    max_cost: f64,
    latency_window_ms: f64,
}

impl RewardModel {
    /// Build a reward model
    ///
    /// `max_cost` is the effective per-request ceiling, or the configured
    /// reference cost when no ceiling applies.
    pub fn new(weights: RewardWeights, max_cost: f64, latency_window: Duration) -> Self {
        let (cost, latency, quality) = normalize(weights);
        Self {
            cost_weight: cost,
            latency_weight: latency,
            quality_weight: quality,
            max_cost,
            latency_window_ms: latency_window.as_secs_f64() * 1000.0,
        }
    }

    /// Reward in `[0, 1]` for one completed request
    pub fn compute(&self, cost: f64, latency: Duration, quality: f64) -> f64 {
        let cost_norm = ratio(cost, self.max_cost);
        let latency_norm = ratio(latency.as_secs_f64() * 1000.0, self.latency_window_ms);
        let quality = if quality.is_nan() { 0.0 } else { quality.clamp(0.0, 1.0) };

        let reward = self.cost_weight * (1.0 - cost_norm)
            + self.latency_weight * (1.0 - latency_norm)
            + self.quality_weight * quality;

        reward.clamp(0.0, 1.0)
    }
}

/// `min(1, value / max)`, treating a non-positive max as "any spend saturates"
fn ratio(value: f64, max: f64) -> f64 {
    if value.is_nan() || value <= 0.0 {
        return 0.0;
    }
    if max <= 0.0 {
        return 1.0;
    }
    (value / max).min(1.0)
}

/// Weights as fractions summing to one
///
/// All-unset (or all-zero) weights use 0.5/0.5/0; otherwise unset weights count as zero.
fn normalize(weights: RewardWeights) -> (f64, f64, f64) {
    if weights.cost.is_none() && weights.latency.is_none() && weights.quality.is_none() {
        return (DEFAULT_COST_WEIGHT, DEFAULT_LATENCY_WEIGHT, 0.0);
    }

    let cost = weights.cost.unwrap_or(0.0).max(0.0);
    let latency = weights.latency.unwrap_or(0.0).max(0.0);
    let quality = weights.quality.unwrap_or(0.0).max(0.0);
    let total = cost + latency + quality;

    if total <= 0.0 || !total.is_finite() {
        return (DEFAULT_COST_WEIGHT, DEFAULT_LATENCY_WEIGHT, 0.0);
    }

    (cost / total, latency / total, quality / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(cost: f64, latency: f64, quality: f64) -> RewardWeights {
        RewardWeights {
            cost: Some(cost),
            latency: Some(latency),
            quality: Some(quality),
        }
    }

    #[test]
    fn weighted_reward_is_exact() {
        let model = RewardModel::new(weights(1.0, 1.0, 2.0), 0.02, Duration::from_millis(3000));
        let reward = model.compute(0.01, Duration::from_millis(1500), 0.8);
        assert!((reward - 0.65).abs() < 1e-12, "reward was {reward}");
    }

    #[test]
    fn defaults_ignore_quality() {
        let model = RewardModel::new(RewardWeights::default(), 0.02, Duration::from_millis(3000));
        let reward = model.compute(0.01, Duration::from_millis(1500), 1.0);
        assert!((reward - 0.5).abs() < 1e-12);
    }

    #[test]
    fn free_and_instant_is_perfect() {
        let model = RewardModel::new(RewardWeights::default(), 0.02, Duration::from_secs(30));
        assert!((model.compute(0.0, Duration::ZERO, 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn inputs_beyond_max_saturate() {
        let model = RewardModel::new(weights(1.0, 1.0, 0.0), 0.01, Duration::from_secs(1));
        assert!(model.compute(5.0, Duration::from_secs(60), 0.0).abs() < 1e-12);
    }

    #[test]
    fn reward_stays_in_unit_interval() {
        let model = RewardModel::new(weights(0.3, 0.2, 0.5), 0.05, Duration::from_secs(10));
        for cost in [0.0, 0.001, 0.05, 3.0, f64::NAN] {
            for latency_ms in [0, 10, 10_000, 1_000_000] {
                for quality in [-1.0, 0.0, 0.5, 1.0, 7.0] {
                    let reward = model.compute(cost, Duration::from_millis(latency_ms), quality);
                    assert!((0.0..=1.0).contains(&reward), "reward {reward} out of range");
                }
            }
        }
    }

    #[test]
    fn zero_weights_fall_back_to_defaults() {
        let model = RewardModel::new(weights(0.0, 0.0, 0.0), 0.02, Duration::from_millis(3000));
        let reward = model.compute(0.01, Duration::from_millis(1500), 0.0);
        assert!((reward - 0.5).abs() < 1e-12);
    }
}
