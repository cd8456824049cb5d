//! Per-tenant request rate limiting
//!
//! Each tenant gets minute, hour, and day limits, each a token bucket backed
//! by an exact rolling count, plus a short sliding-window burst guard. A request is admitted only if every check
//! passes; a rejection consumes nothing. An optional process-wide limiter
//! caps total throughput across tenants.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate, clippy::cast_precision_loss)]

mod bucket;
mod error;
mod global;
mod tenant;
mod window;

pub use bucket::TokenBucket;
pub use error::{RateLimitError, RateWindow};
pub use global::GlobalLimiter;
pub use tenant::TenantLimiter;
pub use window::SlidingWindow;

use std::time::Duration;

fn parse_duration(s: &str) -> Result<Duration, RateLimitError> {
    duration_str::parse(s).map_err(|e| RateLimitError::Config(format!("invalid duration '{s}': {e}")))
}
