use serde::Deserialize;
use url::Url;

/// Response cache configuration
///
/// Both tiers are optional; an absent table disables that tier.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Exact-match cache keyed by prompt, model, and provider preferences
    #[serde(default)]
    pub exact: Option<ExactCacheConfig>,
    /// Similarity cache consulted before the exact tier
    #[serde(default)]
    pub semantic: Option<SemanticCacheConfig>,
    /// Background write-back queue
    #[serde(default)]
    pub writer: CacheWriterConfig,
}

/// Exact-match cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExactCacheConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: CacheBackend,
    /// Entry TTL in seconds
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Maximum entries held by the in-memory backend
    #[serde(default = "default_exact_capacity")]
    pub capacity: u64,
    /// Key prefix in Valkey
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Exact cache storage backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheBackend {
    /// In-process storage (single instance only)
    #[default]
    Memory,
    /// Valkey/Redis storage shared between instances
    Redis(RedisCacheConfig),
}

/// Valkey connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisCacheConfig {
    /// Connection URL
    pub url: Url,
}

/// Semantic cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SemanticCacheConfig {
    /// Namespace entries are partitioned under
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Minimum cosine similarity for a candidate hit
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    /// Observe hits without serving them unless they clear `promotion_threshold`
    #[serde(default = "default_true")]
    pub shadow_mode: bool,
    /// Similarity at which a shadow hit is served anyway
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: f64,
    /// Lookup budget in milliseconds; slower lookups count as a miss
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    /// Maximum entries kept per (namespace, model) partition
    #[serde(default = "default_semantic_capacity")]
    pub capacity: usize,
    /// Entry TTL in seconds
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

/// Background cache writer configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheWriterConfig {
    /// Number of worker tasks draining the queue
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Queue capacity; writes beyond it are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for CacheWriterConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_ttl_seconds() -> u64 {
    3600
}
#[allow(clippy::missing_const_for_fn)]
fn default_exact_capacity() -> u64 {
    10_000
}
fn default_key_prefix() -> String {
    "tollgate:cache".to_owned()
}
fn default_namespace() -> String {
    "default".to_owned()
}
#[allow(clippy::missing_const_for_fn)]
fn default_min_similarity() -> f64 {
    0.85
}
#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}
#[allow(clippy::missing_const_for_fn)]
fn default_promotion_threshold() -> f64 {
    0.95
}
#[allow(clippy::missing_const_for_fn)]
fn default_lookup_timeout_ms() -> u64 {
    250
}
#[allow(clippy::missing_const_for_fn)]
fn default_semantic_capacity() -> usize {
    5000
}
#[allow(clippy::missing_const_for_fn)]
fn default_workers() -> usize {
    2
}
#[allow(clippy::missing_const_for_fn)]
fn default_queue_capacity() -> usize {
    256
}
