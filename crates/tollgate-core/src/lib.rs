//! Shared request types for the tollgate LLM gateway
//!
//! Everything here is plain data: the per-call [`RouteRequest`], the
//! tenant identity it is billed against, the provider-preference table
//! that participates in cache keys, and the small value types passed
//! between the batcher and the learning collaborator.

#![allow(clippy::must_use_candidate)]

mod context;
mod provider;

pub use context::{BatchKey, RewardSample, RouteRequest, TenantKey};
pub use provider::ProviderPreferences;

/// Task category used when a request's category has no candidate list
pub const FALLBACK_TASK: &str = "general";
