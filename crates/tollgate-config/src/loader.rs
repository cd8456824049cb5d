use std::path::Path;

use tollgate_core::FALLBACK_TASK;

use crate::{BudgetConfig, Config, RateLimitConfig, RewardWeights};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_routing()?;
        validate_budget("budget", &self.budget)?;
        validate_rate_limit("rate_limit", &self.rate_limit)?;
        self.validate_cache()?;
        self.validate_batching()?;
        self.validate_executor()?;
        self.validate_reward()?;
        self.validate_tenants()?;
        Ok(())
    }

    fn validate_routing(&self) -> anyhow::Result<()> {
        let routing = &self.routing;

        if !routing.task_models.is_empty() && !routing.task_models.contains_key(FALLBACK_TASK) {
            anyhow::bail!("routing.task_models must define a '{FALLBACK_TASK}' entry");
        }

        for (task, models) in &routing.task_models {
            if models.is_empty() {
                anyhow::bail!("routing.task_models.{task} must list at least one model");
            }
        }

        validate_prices("routing.prices", routing.prices.iter())?;

        if let Some(ceiling) = routing.max_cost_per_request {
            ensure_positive("routing.max_cost_per_request", ceiling)?;
        }

        Ok(())
    }

    fn validate_cache(&self) -> anyhow::Result<()> {
        if let Some(ref exact) = self.cache.exact {
            if exact.ttl_seconds == 0 {
                anyhow::bail!("cache.exact.ttl_seconds must be greater than 0");
            }
            if exact.capacity == 0 {
                anyhow::bail!("cache.exact.capacity must be greater than 0");
            }
        }

        if let Some(ref semantic) = self.cache.semantic {
            ensure_unit("cache.semantic.min_similarity", semantic.min_similarity)?;
            ensure_unit("cache.semantic.promotion_threshold", semantic.promotion_threshold)?;
            if semantic.promotion_threshold < semantic.min_similarity {
                anyhow::bail!("cache.semantic.promotion_threshold must not be below min_similarity");
            }
            if semantic.capacity == 0 {
                anyhow::bail!("cache.semantic.capacity must be greater than 0");
            }
        }

        if self.cache.writer.workers == 0 || self.cache.writer.queue_capacity == 0 {
            anyhow::bail!("cache.writer.workers and cache.writer.queue_capacity must be greater than 0");
        }

        Ok(())
    }

    fn validate_batching(&self) -> anyhow::Result<()> {
        let batching = &self.batching;

        if batching.batch_size == 0 {
            anyhow::bail!("batching.batch_size must be at least 1");
        }

        if batching.max_wait_ms == 0 {
            anyhow::bail!("batching.max_wait_ms must be greater than 0");
        }

        if batching.wait_ms > batching.max_wait_ms {
            anyhow::bail!("batching.wait_ms must not exceed batching.max_wait_ms");
        }

        Ok(())
    }

    fn validate_executor(&self) -> anyhow::Result<()> {
        let executor = &self.executor;

        if executor.max_attempts == 0 {
            anyhow::bail!("executor.max_attempts must be at least 1");
        }

        if !(executor.compression_target > 0.0 && executor.compression_target < 1.0) {
            anyhow::bail!("executor.compression_target must be between 0 and 1 (exclusive)");
        }

        if let Some((model, _)) = executor.max_token_overrides.iter().find(|(_, limit)| **limit == 0) {
            anyhow::bail!("executor.max_token_overrides.{model} must be greater than 0");
        }

        Ok(())
    }

    fn validate_reward(&self) -> anyhow::Result<()> {
        validate_weights("reward.weights", self.reward.weights)?;

        if self.reward.latency_window_ms == 0 {
            anyhow::bail!("reward.latency_window_ms must be greater than 0");
        }
        ensure_positive("reward.cost_reference", self.reward.cost_reference)
    }

    fn validate_tenants(&self) -> anyhow::Result<()> {
        for (key, tenant) in &self.tenants {
            if key.is_empty() || key.split('/').count() > 2 || key.split('/').any(str::is_empty) {
                anyhow::bail!("tenant key '{key}' must be 'tenant' or 'tenant/workspace'");
            }

            validate_prices(&format!("tenants.{key}.prices"), tenant.prices.iter())?;

            if let Some(ceiling) = tenant.max_cost_per_request {
                ensure_positive(&format!("tenants.{key}.max_cost_per_request"), ceiling)?;
            }

            if let Some(ref budget) = tenant.budget {
                validate_budget(&format!("tenants.{key}.budget"), budget)?;
            }

            if let Some(ref overrides) = tenant.rate_limit {
                let merged = self.rate_limit.overlay(Some(overrides));
                validate_rate_limit(&format!("tenants.{key}.rate_limit"), &merged)?;
            }

            if let Some(weights) = tenant.reward_weights {
                validate_weights(&format!("tenants.{key}.reward_weights"), weights)?;
            }
        }

        Ok(())
    }
}

fn validate_prices<'a>(section: &str, prices: impl Iterator<Item = (&'a String, &'a f64)>) -> anyhow::Result<()> {
    for (model, price) in prices {
        if !price.is_finite() || *price < 0.0 {
            anyhow::bail!("{section}.{model} must be a non-negative number");
        }
    }
    Ok(())
}

fn validate_budget(section: &str, budget: &BudgetConfig) -> anyhow::Result<()> {
    if let Some(total) = budget.total_limit {
        ensure_positive(&format!("{section}.total_limit"), total)?;
    }
    for (task, limit) in &budget.per_task_limits {
        ensure_positive(&format!("{section}.per_task_limits.{task}"), *limit)?;
    }
    Ok(())
}

fn validate_rate_limit(section: &str, limits: &RateLimitConfig) -> anyhow::Result<()> {
    if limits.per_minute == 0 || limits.per_hour == 0 || limits.per_day == 0 || limits.burst == 0 {
        anyhow::bail!("{section} limits must be greater than 0");
    }

    let window = duration_str::parse(&limits.burst_window)
        .map_err(|e| anyhow::anyhow!("{section}.burst_window is not a valid duration: {e}"))?;
    if window.is_zero() {
        anyhow::bail!("{section}.burst_window must be greater than 0");
    }

    if let Some(ref global) = limits.global {
        if global.requests == 0 {
            anyhow::bail!("{section}.global.requests must be greater than 0");
        }
        duration_str::parse(&global.window)
            .map_err(|e| anyhow::anyhow!("{section}.global.window is not a valid duration: {e}"))?;
    }

    Ok(())
}

fn validate_weights(section: &str, weights: RewardWeights) -> anyhow::Result<()> {
    for (name, weight) in [("cost", weights.cost), ("latency", weights.latency), ("quality", weights.quality)] {
        if let Some(weight) = weight
            && (!weight.is_finite() || weight < 0.0)
        {
            anyhow::bail!("{section}.{name} must be a non-negative number");
        }
    }
    Ok(())
}

fn ensure_positive(field: &str, value: f64) -> anyhow::Result<()> {
    if !value.is_finite() || value <= 0.0 {
        anyhow::bail!("{field} must be greater than 0");
    }
    Ok(())
}

fn ensure_unit(field: &str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        anyhow::bail!("{field} must be between 0 and 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheBackend, TokenizerKind};

    const FULL: &str = r#"
        [routing]
        max_cost_per_request = 1.0
        tokenizer = "heuristic"
        provider = { order = ["anthropic", "openai"], allow_fallbacks = true }

        [routing.task_models]
        general = ["openai/gpt-4o-mini"]
        code = ["anthropic/claude-sonnet", "openai/gpt-4o-mini"]

        [routing.prices]
        "openai/gpt-4o-mini" = 0.0006
        "anthropic/claude-sonnet" = 0.015

        [budget]
        total_limit = 50.0
        per_task_limits = { code = 10.0 }

        [rate_limit]
        per_minute = 30
        global = { requests = 500, window = "1m" }

        [cache.exact]
        backend = { type = "memory" }

        [batching]
        enabled = true
        batch_size = 4

        [executor]
        max_attempts = 2

        [reward.weights]
        cost = 1.0
        latency = 1.0
        quality = 2.0

        [tenants.acme]
        max_cost_per_request = 0.5
        task_models = { default = ["openai/gpt-4o-mini"] }

        [tenants."acme/research".rate_limit]
        per_minute = 5
    "#;

    #[test]
    fn full_config_parses() {
        let config = Config::from_toml_str(FULL).unwrap();

        assert_eq!(config.routing.tokenizer, TokenizerKind::Heuristic);
        assert_eq!(config.routing.task_models["code"].len(), 2);
        assert_eq!(config.rate_limit.per_minute, 30);
        assert_eq!(config.rate_limit.per_hour, 1000);
        assert_eq!(config.cache.exact.as_ref().unwrap().backend, CacheBackend::Memory);
        assert!(config.cache.semantic.is_none());
        assert!(config.batching.enabled);
        assert_eq!(config.batching.batch_size, 4);
        assert_eq!(config.tenants.len(), 2);
        assert_eq!(config.tenants["acme/research"].rate_limit.as_ref().unwrap().per_minute, Some(5));
        assert!(config.executor.is_offline());
    }

    #[test]
    fn empty_config_is_valid() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.routing.task_models.is_empty());
        assert!(config.telemetry.is_none());
    }

    #[test]
    fn missing_general_rejected() {
        let err = Config::from_toml_str("[routing.task_models]\ncode = [\"m\"]").unwrap_err();
        assert!(err.to_string().contains("general"));
    }

    #[test]
    fn negative_price_rejected() {
        let err = Config::from_toml_str("[routing.prices]\nm = -1.0").unwrap_err();
        assert!(err.to_string().contains("routing.prices.m"));
    }

    #[test]
    fn wait_above_max_wait_rejected() {
        let err = Config::from_toml_str("[batching]\nwait_ms = 500\nmax_wait_ms = 100").unwrap_err();
        assert!(err.to_string().contains("wait_ms"));
    }

    #[test]
    fn bad_burst_window_rejected() {
        let err = Config::from_toml_str("[rate_limit]\nburst_window = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("burst_window"));
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = Config::from_toml_str("[routing]\nmodels = []").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn invalid_tenant_key_rejected() {
        let err = Config::from_toml_str("[tenants.\"a/b/c\"]").unwrap_err();
        assert!(err.to_string().contains("a/b/c"));
    }

    #[test]
    fn compression_target_bounds() {
        assert!(Config::from_toml_str("[executor]\ncompression_target = 1.0").is_err());
        assert!(Config::from_toml_str("[executor]\ncompression_target = 0.3").is_ok());
    }

    #[test]
    fn load_from_file_expands_env() {
        let dir = std::env::temp_dir().join(format!("tollgate-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tollgate.toml");
        std::fs::write(
            &path,
            "[executor.upstream]\nbase_url = \"{{ env.TG_LOADER_URL }}\"\napi_key = \"{{ env.TG_LOADER_KEY | default(\"none\") }}\"\n",
        )
        .unwrap();

        temp_env::with_vars(
            [("TG_LOADER_URL", Some("https://openrouter.ai/api/v1")), ("TG_LOADER_KEY", None)],
            || {
                let config = Config::load(&path).unwrap();
                let upstream = config.executor.upstream.unwrap();
                assert_eq!(upstream.base_url.as_str(), "https://openrouter.ai/api/v1");
            },
        );

        std::fs::remove_dir_all(&dir).ok();
    }
}
