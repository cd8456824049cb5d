use std::time::Duration;

use async_trait::async_trait;
use mini_moka::sync::Cache;

use crate::{CacheError, CachedResponse};

/// Exact-match cache backend
#[async_trait]
pub trait ExactCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheError>;

    async fn set(&self, key: &str, response: &CachedResponse) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process exact cache with TTL and capacity eviction
#[derive(Clone)]
pub struct MemoryExactCache {
    entries: Cache<String, CachedResponse>,
}

impl MemoryExactCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).time_to_live(ttl).build(),
        }
    }
}

#[async_trait]
impl ExactCache for MemoryExactCache {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        Ok(self.entries.get(&key.to_owned()))
    }

    async fn set(&self, key: &str, response: &CachedResponse) -> Result<(), CacheError> {
        self.entries.insert(key.to_owned(), response.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(&key.to_owned());
        Ok(())
    }
}

/// Valkey-backed exact cache shared between gateway instances
#[derive(Clone)]
pub struct RedisExactCache {
    client: redis::Client,
    ttl: Duration,
    key_prefix: String,
}

impl RedisExactCache {
    /// Create a cache client; no connection is made until first use
    ///
    /// # Errors
    ///
    /// Returns an error if the Valkey URL is invalid
    pub fn new(url: &str, ttl: Duration, key_prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Backend(format!("invalid URL: {e}")))?;

        Ok(Self {
            client,
            ttl,
            key_prefix: key_prefix.into(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(format!("connection failed: {e}")))
    }
}

#[async_trait]
impl ExactCache for RedisExactCache {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        use redis::AsyncCommands;

        let mut conn = self.connection().await?;
        let data: Option<String> = conn
            .get(self.namespaced(key))
            .await
            .map_err(|e| CacheError::Backend(format!("GET failed: {e}")))?;

        data.map(|data| {
            serde_json::from_str(&data).map_err(|e| CacheError::Serialization(format!("deserialize: {e}")))
        })
        .transpose()
    }

    async fn set(&self, key: &str, response: &CachedResponse) -> Result<(), CacheError> {
        use redis::AsyncCommands;

        let data =
            serde_json::to_string(response).map_err(|e| CacheError::Serialization(format!("serialize: {e}")))?;

        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(self.namespaced(key), data, self.ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Backend(format!("SET failed: {e}")))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        use redis::AsyncCommands;

        let mut conn = self.connection().await?;
        let _: () = conn
            .del(self.namespaced(key))
            .await
            .map_err(|e| CacheError::Backend(format!("DEL failed: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(text: &str) -> CachedResponse {
        CachedResponse {
            text: text.to_owned(),
            model: "gpt-4o-mini".to_owned(),
            input_tokens: 12,
            output_tokens: 40,
        }
    }

    #[tokio::test]
    async fn memory_set_then_get() {
        let cache = MemoryExactCache::new(100, Duration::from_secs(60));
        cache.set("k", &response("hello")).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(response("hello")));
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_delete_removes_entry() {
        let cache = MemoryExactCache::new(100, Duration::from_secs(60));
        cache.set("k", &response("hello")).await.unwrap();
        cache.delete("k").await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[test]
    fn redis_rejects_invalid_url() {
        assert!(RedisExactCache::new("not a url", Duration::from_secs(60), "tollgate:cache").is_err());
    }

    #[test]
    fn redis_keys_are_prefixed() {
        let cache = RedisExactCache::new("redis://localhost:6379", Duration::from_secs(60), "tollgate:cache").unwrap();
        assert_eq!(cache.namespaced("abc"), "tollgate:cache:abc");
    }
}
