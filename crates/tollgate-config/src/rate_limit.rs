use serde::Deserialize;

/// Per-tenant request rate limits
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests allowed per minute
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
    /// Requests allowed per hour
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,
    /// Requests allowed per day
    #[serde(default = "default_per_day")]
    pub per_day: u32,
    /// Requests allowed inside the short burst window
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Burst window duration (e.g. "10s")
    #[serde(default = "default_burst_window")]
    pub burst_window: String,
    /// Process-wide limit shared by every tenant
    #[serde(default)]
    pub global: Option<RequestRateLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
            per_day: default_per_day(),
            burst: default_burst(),
            burst_window: default_burst_window(),
            global: None,
        }
    }
}

impl RateLimitConfig {
    /// Apply a tenant override on top of these limits
    #[must_use]
    pub fn overlay(&self, tenant: Option<&RateLimitOverride>) -> Self {
        let Some(tenant) = tenant else {
            return self.clone();
        };

        Self {
            per_minute: tenant.per_minute.unwrap_or(self.per_minute),
            per_hour: tenant.per_hour.unwrap_or(self.per_hour),
            per_day: tenant.per_day.unwrap_or(self.per_day),
            burst: tenant.burst.unwrap_or(self.burst),
            burst_window: tenant.burst_window.clone().unwrap_or_else(|| self.burst_window.clone()),
            global: self.global.clone(),
        }
    }
}

/// Tenant-level rate limit override; unset fields inherit the global value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitOverride {
    #[serde(default)]
    pub per_minute: Option<u32>,
    #[serde(default)]
    pub per_hour: Option<u32>,
    #[serde(default)]
    pub per_day: Option<u32>,
    #[serde(default)]
    pub burst: Option<u32>,
    #[serde(default)]
    pub burst_window: Option<String>,
}

/// Request-based rate limit
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestRateLimit {
    /// Maximum requests per window
    pub requests: u32,
    /// Window duration (e.g. "1m", "1h")
    pub window: String,
}

fn default_per_minute() -> u32 {
    60
}
fn default_per_hour() -> u32 {
    1000
}
fn default_per_day() -> u32 {
    10_000
}
fn default_burst() -> u32 {
    20
}
fn default_burst_window() -> String {
    "10s".to_owned()
}
