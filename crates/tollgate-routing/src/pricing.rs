//! Price tables and projected cost

use std::collections::HashMap;

/// Model prices in USD per 1K tokens
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    prices: HashMap<String, f64>,
}

impl PriceTable {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        Self { prices }
    }

    /// Global prices with tenant overrides replacing entries for the same model
    pub fn merged(global: &HashMap<String, f64>, overrides: &HashMap<String, f64>) -> Self {
        let mut prices = global.clone();
        prices.extend(overrides.iter().map(|(model, price)| (model.clone(), *price)));
        Self { prices }
    }

    /// Price per 1K tokens; models without an entry are free
    pub fn price(&self, model: &str) -> f64 {
        self.prices.get(model).copied().unwrap_or(0.0)
    }

    /// Projected cost of sending `tokens` tokens to `model`
    pub fn estimate_cost(&self, tokens: usize, model: &str) -> f64 {
        tokens as f64 / 1000.0 * self.price(model)
    }

    /// Cheapest candidate whose projected cost fits under `max_cost`
    ///
    /// Ties keep candidate order.
    pub fn affordable_model<'a>(&self, tokens: usize, candidates: &'a [String], max_cost: f64) -> Option<&'a str> {
        let mut best: Option<(&str, f64)> = None;

        for model in candidates {
            let cost = self.estimate_cost(tokens, model);
            if cost > max_cost {
                continue;
            }
            if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                best = Some((model, cost));
            }
        }

        best.map(|(model, _)| model)
    }
}
