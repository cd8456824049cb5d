//! Two-tier response cache
//!
//! - **Exact**: keyed by a SHA-256 over prompt, model, and provider
//!   preference signature. In-process (`mini-moka`) or Valkey-backed.
//! - **Semantic**: similarity lookup partitioned by namespace, provider
//!   preference signature, and model, with a shadow mode that only serves hits above a promotion threshold.
//!
//! Cache faults never fail a request; [`CacheTier`] logs them and reports a miss.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc, clippy::cast_precision_loss)]

mod exact;
mod semantic;
mod tier;
mod writer;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use exact::{ExactCache, MemoryExactCache, RedisExactCache};
pub use semantic::{MemorySemanticCache, SemanticCache, SemanticHit};
pub use tier::{CacheHit, CacheLookup, CacheTier, CacheTierKind, SemanticPolicy};
pub use writer::{CacheWriter, SemanticWrite};

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Valkey connection or command error
    #[error("cache backend: {0}")]
    Backend(String),
    /// Serialization error
    #[error("serialization: {0}")]
    Serialization(String),
}

/// Cached completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Response text
    pub text: String,
    /// Model that produced the response
    pub model: String,
    /// Prompt tokens of the original call
    pub input_tokens: usize,
    /// Completion tokens of the original call
    pub output_tokens: usize,
}

/// Exact-cache key for a prompt sent to a model with given provider preferences
///
/// Hashes canonical JSON of all three inputs, so requests that differ in any
/// of them never share an entry.
pub fn cache_key(prompt: &str, model: &str, provider_signature: &str) -> String {
    let canonical = serde_json::json!({
        "model": model,
        "prompt": prompt,
        "provider": provider_signature,
    });
    let hash = Sha256::digest(canonical.to_string().as_bytes());
    format!("{hash:x}")
}
