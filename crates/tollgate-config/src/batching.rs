use serde::Deserialize;

/// Request coalescing configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchingConfig {
    /// Whether requests sharing a model and task are coalesced
    #[serde(default)]
    pub enabled: bool,
    /// Flush as soon as this many requests are pending
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Nominal wait before a partial batch is flushed, in milliseconds
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
    /// Hard ceiling on how long the oldest member may wait, in milliseconds
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: default_batch_size(),
            wait_ms: default_wait_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_batch_size() -> usize {
    8
}
#[allow(clippy::missing_const_for_fn)]
fn default_wait_ms() -> u64 {
    50
}
#[allow(clippy::missing_const_for_fn)]
fn default_max_wait_ms() -> u64 {
    200
}
