use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::CacheError;

/// Embedding dimensions of the in-process backend
const DIMENSIONS: usize = 256;

/// A similarity match returned by a semantic backend
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    /// Cached response text
    pub text: String,
    /// Cosine similarity between the query and the cached prompt
    pub similarity: f64,
}

/// Similarity cache backend
///
/// Entries never cross `(namespace, model)` partitions.
#[async_trait]
pub trait SemanticCache: Send + Sync {
    /// Best match for `prompt`, if any clears the backend's similarity floor
    async fn lookup(&self, prompt: &str, model: &str, namespace: &str) -> Result<Option<SemanticHit>, CacheError>;

    async fn store(&self, prompt: &str, model: &str, namespace: &str, text: &str) -> Result<(), CacheError>;
}

struct Entry {
    embedding: Vec<f32>,
    text: String,
    stored_at: Instant,
}

/// In-process semantic cache over feature-hashed bag-of-words embeddings
pub struct MemorySemanticCache {
    partitions: DashMap<(String, String), VecDeque<Entry>>,
    min_similarity: f64,
    capacity: usize,
    ttl: Duration,
}

impl MemorySemanticCache {
    /// `capacity` bounds each `(namespace, model)` partition; oldest entries go first
    pub fn new(min_similarity: f64, capacity: usize, ttl: Duration) -> Self {
        Self {
            partitions: DashMap::new(),
            min_similarity,
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Live entries across all partitions
    pub fn len(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| p.value().iter().filter(|e| e.stored_at.elapsed() < self.ttl).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SemanticCache for MemorySemanticCache {
    async fn lookup(&self, prompt: &str, model: &str, namespace: &str) -> Result<Option<SemanticHit>, CacheError> {
        let Some(query) = embed(prompt) else {
            return Ok(None);
        };
        let Some(partition) = self.partitions.get(&(namespace.to_owned(), model.to_owned())) else {
            return Ok(None);
        };

        let best = partition
            .iter()
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| (entry, cosine(&query, &entry.embedding)))
            .filter(|(_, similarity)| *similarity >= self.min_similarity)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        Ok(best.map(|(entry, similarity)| SemanticHit {
            text: entry.text.clone(),
            similarity,
        }))
    }

    async fn store(&self, prompt: &str, model: &str, namespace: &str, text: &str) -> Result<(), CacheError> {
        let Some(embedding) = embed(prompt) else {
            return Ok(());
        };

        let mut partition = self
            .partitions
            .entry((namespace.to_owned(), model.to_owned()))
            .or_default();

        partition.retain(|entry| entry.stored_at.elapsed() < self.ttl);
        while partition.len() >= self.capacity {
            partition.pop_front();
        }
        partition.push_back(Entry {
            embedding,
            text: text.to_owned(),
            stored_at: Instant::now(),
        });

        Ok(())
    }
}

/// Unit-length hashed term-frequency vector; `None` for text without words
fn embed(text: &str) -> Option<Vec<f32>> {
    let mut vector = vec![0.0f32; DIMENSIONS];

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
    {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        let hash = hasher.finish();
        #[allow(clippy::cast_possible_truncation)]
        let index = (hash % DIMENSIONS as u64) as usize;
        // High bit picks the sign so colliding words partly cancel out
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return None;
    }
    for v in &mut vector {
        *v /= norm;
    }
    Some(vector)
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    f64::from(a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>()).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MemorySemanticCache {
        MemorySemanticCache::new(0.85, 10, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn identical_prompt_is_a_perfect_hit() {
        let cache = cache();
        cache.store("What is the capital of France?", "gpt-4o", "default", "Paris").await.unwrap();

        let hit = cache.lookup("what is the capital of france", "gpt-4o", "default").await.unwrap().unwrap();
        assert_eq!(hit.text, "Paris");
        assert!((hit.similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unrelated_prompt_misses() {
        let cache = cache();
        cache.store("What is the capital of France?", "gpt-4o", "default", "Paris").await.unwrap();

        let hit = cache.lookup("Write a haiku about autumn leaves", "gpt-4o", "default").await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn partitions_do_not_cross_models_or_namespaces() {
        let cache = cache();
        cache.store("What is the capital of France?", "gpt-4o", "default", "Paris").await.unwrap();

        let prompt = "What is the capital of France?";
        assert!(cache.lookup(prompt, "gpt-4o-mini", "default").await.unwrap().is_none());
        assert!(cache.lookup(prompt, "gpt-4o", "support").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let cache = MemorySemanticCache::new(0.99, 2, Duration::from_secs(60));
        cache.store("first prompt alpha", "m", "n", "1").await.unwrap();
        cache.store("second prompt beta", "m", "n", "2").await.unwrap();
        cache.store("third prompt gamma", "m", "n", "3").await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("first prompt alpha", "m", "n").await.unwrap().is_none());
        assert!(cache.lookup("third prompt gamma", "m", "n").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_entries_are_ignored() {
        let cache = MemorySemanticCache::new(0.85, 10, Duration::ZERO);
        cache.store("hello there", "m", "n", "hi").await.unwrap();
        assert!(cache.lookup("hello there", "m", "n").await.unwrap().is_none());
    }

    #[test]
    fn empty_text_has_no_embedding() {
        assert!(embed("  ... ").is_none());
    }
}
