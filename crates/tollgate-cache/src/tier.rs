use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tollgate_config::{CacheBackend, CacheConfig, SemanticCacheConfig};

use crate::{
    CacheError, CacheWriter, CachedResponse, ExactCache, MemoryExactCache, MemorySemanticCache, RedisExactCache,
    SemanticCache, SemanticWrite, cache_key,
};

/// Which tier served a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTierKind {
    Semantic,
    Exact,
}

impl CacheTierKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Exact => "exact",
        }
    }
}

/// A cached response that may be returned to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub response: CachedResponse,
    pub tier: CacheTierKind,
    /// Similarity for semantic hits
    pub similarity: Option<f64>,
}

/// Outcome of a lookup across both tiers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheLookup {
    /// Exact-cache key, when the exact tier is configured
    pub key: Option<String>,
    /// Hit to serve, if any
    pub hit: Option<CacheHit>,
    /// Similarity of a semantic match observed in shadow mode but not served
    pub shadow_similarity: Option<f64>,
}

/// How semantic matches are used
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticPolicy {
    pub namespace: String,
    /// Record matches without serving them below `promotion_threshold`
    pub shadow_mode: bool,
    pub promotion_threshold: f64,
    /// Lookups slower than this count as a miss
    pub lookup_timeout: Duration,
}

impl From<&SemanticCacheConfig> for SemanticPolicy {
    fn from(config: &SemanticCacheConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            shadow_mode: config.shadow_mode,
            promotion_threshold: config.promotion_threshold,
            lookup_timeout: Duration::from_millis(config.lookup_timeout_ms),
        }
    }
}

struct SemanticTier {
    cache: Arc<dyn SemanticCache>,
    policy: SemanticPolicy,
    writer: CacheWriter,
}

impl SemanticTier {
    /// Backend namespace for one provider signature
    ///
    /// The signature digest has a fixed width, so distinct
    /// `(namespace, signature)` pairs never map to the same partition.
    fn namespace_for(&self, provider_signature: &str) -> String {
        let digest = Sha256::digest(provider_signature.as_bytes());
        format!("{}/{digest:x}", self.policy.namespace)
    }
}

/// Semantic-then-exact cache lookup and write-back
///
/// The only writer of cache entries. Every backend fault is logged and
/// degrades to a miss.
#[derive(Clone, Default)]
pub struct CacheTier {
    exact: Option<Arc<dyn ExactCache>>,
    semantic: Option<Arc<SemanticTier>>,
}

impl CacheTier {
    /// Tier with no backends; every lookup misses
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build the configured backends
    ///
    /// Must be called inside a Tokio runtime when a semantic tier is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the Valkey URL is invalid
    pub fn from_config(config: &CacheConfig, shutdown: CancellationToken) -> Result<Self, CacheError> {
        let mut tier = Self::disabled();

        if let Some(ref exact) = config.exact {
            let ttl = Duration::from_secs(exact.ttl_seconds);
            let cache: Arc<dyn ExactCache> = match exact.backend {
                CacheBackend::Memory => Arc::new(MemoryExactCache::new(exact.capacity, ttl)),
                CacheBackend::Redis(ref redis) => {
                    Arc::new(RedisExactCache::new(redis.url.as_str(), ttl, exact.key_prefix.clone())?)
                }
            };
            tier = tier.with_exact(cache);
        }

        if let Some(ref semantic) = config.semantic {
            let cache = Arc::new(MemorySemanticCache::new(
                semantic.min_similarity,
                semantic.capacity,
                Duration::from_secs(semantic.ttl_seconds),
            ));
            let writer = CacheWriter::spawn(cache.clone(), &config.writer, shutdown);
            tier = tier.with_semantic(cache, SemanticPolicy::from(semantic), writer);
        }

        Ok(tier)
    }

    #[must_use]
    pub fn with_exact(mut self, cache: Arc<dyn ExactCache>) -> Self {
        self.exact = Some(cache);
        self
    }

    #[must_use]
    pub fn with_semantic(mut self, cache: Arc<dyn SemanticCache>, policy: SemanticPolicy, writer: CacheWriter) -> Self {
        self.semantic = Some(Arc::new(SemanticTier { cache, policy, writer }));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.exact.is_some() || self.semantic.is_some()
    }

    /// Look up a response: semantic tier first, then exact
    pub async fn lookup(&self, prompt: &str, model: &str, provider_signature: &str) -> CacheLookup {
        let mut outcome = CacheLookup {
            key: self.exact.as_ref().map(|_| cache_key(prompt, model, provider_signature)),
            ..CacheLookup::default()
        };

        if let Some(ref semantic) = self.semantic
            && let Some(hit) = semantic_lookup(semantic, prompt, model, provider_signature).await
        {
            let promoted = hit.similarity >= semantic.policy.promotion_threshold;
            if !semantic.policy.shadow_mode || promoted {
                tracing::debug!(model, similarity = hit.similarity, "semantic cache hit");
                outcome.hit = Some(CacheHit {
                    response: CachedResponse {
                        text: hit.text,
                        model: model.to_owned(),
                        input_tokens: 0,
                        output_tokens: 0,
                    },
                    tier: CacheTierKind::Semantic,
                    similarity: Some(hit.similarity),
                });
                return outcome;
            }

            tracing::debug!(model, similarity = hit.similarity, "semantic cache shadow hit");
            outcome.shadow_similarity = Some(hit.similarity);
        }

        if let (Some(exact), Some(key)) = (&self.exact, &outcome.key) {
            match exact.get(key).await {
                Ok(Some(response)) => {
                    tracing::debug!(model, cache_key = %key, "exact cache hit");
                    outcome.hit = Some(CacheHit {
                        response,
                        tier: CacheTierKind::Exact,
                        similarity: None,
                    });
                }
                Ok(None) => tracing::debug!(model, cache_key = %key, "exact cache miss"),
                Err(e) => tracing::warn!(error = %e, model, "exact cache lookup failed, treating as miss"),
            }
        }

        outcome
    }

    /// Populate both tiers after a successful execution
    ///
    /// The exact write is awaited; the semantic write goes through the
    /// bounded background writer, scoped to `provider_signature`.
    pub async fn store(&self, key: Option<&str>, prompt: &str, provider_signature: &str, response: &CachedResponse) {
        if let (Some(exact), Some(key)) = (&self.exact, key)
            && let Err(e) = exact.set(key, response).await
        {
            tracing::warn!(error = %e, model = %response.model, "exact cache write failed");
        }

        if let Some(ref semantic) = self.semantic {
            semantic.writer.enqueue(SemanticWrite {
                prompt: prompt.to_owned(),
                model: response.model.clone(),
                namespace: semantic.namespace_for(provider_signature),
                text: response.text.clone(),
            });
        }
    }
}

async fn semantic_lookup(
    tier: &SemanticTier,
    prompt: &str,
    model: &str,
    provider_signature: &str,
) -> Option<crate::SemanticHit> {
    let namespace = tier.namespace_for(provider_signature);
    let lookup = tier.cache.lookup(prompt, model, &namespace);

    match tokio::time::timeout(tier.policy.lookup_timeout, lookup).await {
        Ok(Ok(hit)) => hit,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, model, "semantic cache lookup failed, treating as miss");
            None
        }
        Err(_) => {
            tracing::warn!(model, timeout = ?tier.policy.lookup_timeout, "semantic cache lookup timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::SemanticHit;

    /// Semantic backend returning a fixed match
    struct Fixed {
        similarity: f64,
        delay: Duration,
    }

    #[async_trait]
    impl SemanticCache for Fixed {
        async fn lookup(&self, _: &str, _: &str, _: &str) -> Result<Option<SemanticHit>, CacheError> {
            tokio::time::sleep(self.delay).await;
            Ok(Some(SemanticHit {
                text: "semantic answer".to_owned(),
                similarity: self.similarity,
            }))
        }

        async fn store(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), CacheError> {
            Ok(())
        }
    }

    /// Exact backend that always fails
    struct Broken;

    #[async_trait]
    impl ExactCache for Broken {
        async fn get(&self, _: &str) -> Result<Option<CachedResponse>, CacheError> {
            Err(CacheError::Backend("connection refused".to_owned()))
        }

        async fn set(&self, _: &str, _: &CachedResponse) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_owned()))
        }

        async fn delete(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_owned()))
        }
    }

    fn policy(shadow_mode: bool) -> SemanticPolicy {
        SemanticPolicy {
            namespace: "default".to_owned(),
            shadow_mode,
            promotion_threshold: 0.95,
            lookup_timeout: Duration::from_millis(250),
        }
    }

    fn semantic_tier(similarity: f64, shadow_mode: bool, delay: Duration) -> CacheTier {
        let cache = Arc::new(Fixed { similarity, delay });
        let writer = CacheWriter::spawn(cache.clone(), &Default::default(), CancellationToken::new());
        CacheTier::disabled().with_semantic(cache, policy(shadow_mode), writer)
    }

    fn response() -> CachedResponse {
        CachedResponse {
            text: "exact answer".to_owned(),
            model: "gpt-4o".to_owned(),
            input_tokens: 3,
            output_tokens: 7,
        }
    }

    #[tokio::test]
    async fn exact_round_trip() {
        let tier = CacheTier::disabled().with_exact(Arc::new(MemoryExactCache::new(10, Duration::from_secs(60))));

        let miss = tier.lookup("hi", "gpt-4o", "{}").await;
        assert!(miss.hit.is_none());

        tier.store(miss.key.as_deref(), "hi", "{}", &response()).await;
        let hit = tier.lookup("hi", "gpt-4o", "{}").await.hit.unwrap();
        assert_eq!(hit.tier, CacheTierKind::Exact);
        assert_eq!(hit.response, response());
    }

    #[tokio::test]
    async fn provider_signature_separates_entries() {
        let tier = CacheTier::disabled().with_exact(Arc::new(MemoryExactCache::new(10, Duration::from_secs(60))));

        let first = tier.lookup("hi", "gpt-4o", r#"{"order":["openai"]}"#).await;
        tier.store(first.key.as_deref(), "hi", r#"{"order":["openai"]}"#, &response()).await;

        let other = tier.lookup("hi", "gpt-4o", r#"{"order":["azure"]}"#).await;
        assert!(other.hit.is_none());
    }

    #[tokio::test]
    async fn shadow_hit_below_promotion_is_not_served() {
        let tier = semantic_tier(0.9, true, Duration::ZERO);
        let outcome = tier.lookup("hi", "gpt-4o", "{}").await;

        assert!(outcome.hit.is_none());
        assert_eq!(outcome.shadow_similarity, Some(0.9));
    }

    #[tokio::test]
    async fn shadow_hit_above_promotion_is_served() {
        let tier = semantic_tier(0.97, true, Duration::ZERO);
        let hit = tier.lookup("hi", "gpt-4o", "{}").await.hit.unwrap();

        assert_eq!(hit.tier, CacheTierKind::Semantic);
        assert_eq!(hit.response.text, "semantic answer");
    }

    #[tokio::test]
    async fn any_hit_served_without_shadow_mode() {
        let tier = semantic_tier(0.86, false, Duration::ZERO);
        assert!(tier.lookup("hi", "gpt-4o", "{}").await.hit.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_semantic_lookup_is_a_miss() {
        let tier = semantic_tier(1.0, false, Duration::from_secs(5));
        let outcome = tier.lookup("hi", "gpt-4o", "{}").await;
        assert!(outcome.hit.is_none());
    }

    #[tokio::test]
    async fn backend_errors_are_misses() {
        let tier = CacheTier::disabled().with_exact(Arc::new(Broken));
        let outcome = tier.lookup("hi", "gpt-4o", "{}").await;

        assert!(outcome.key.is_some());
        assert!(outcome.hit.is_none());
        tier.store(outcome.key.as_deref(), "hi", "{}", &response()).await;
    }

    #[tokio::test]
    async fn disabled_tier_has_no_key() {
        let outcome = CacheTier::disabled().lookup("hi", "gpt-4o", "{}").await;
        assert_eq!(outcome, CacheLookup::default());
    }

    #[tokio::test]
    async fn provider_signature_separates_semantic_entries() {
        let cache = Arc::new(MemorySemanticCache::new(0.5, 16, Duration::from_secs(60)));
        let writer = CacheWriter::spawn(cache.clone(), &Default::default(), CancellationToken::new());
        let tier = CacheTier::disabled().with_semantic(cache.clone(), policy(false), writer);
        let open = r#"{"data_collection":"allow"}"#;
        let strict = r#"{"data_collection":"deny"}"#;

        tier.store(None, "Explain token buckets.", open, &response()).await;
        while cache.is_empty() {
            tokio::task::yield_now().await;
        }

        assert!(tier.lookup("Explain token buckets.", "gpt-4o", strict).await.hit.is_none());
        let hit = tier.lookup("Explain token buckets.", "gpt-4o", open).await.hit.unwrap();
        assert_eq!(hit.tier, CacheTierKind::Semantic);
        assert_eq!(hit.response.text, "exact answer");
    }
}
