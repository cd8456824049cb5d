//! Model routing for Tollgate
//!
//! Everything the admission core needs to pick and price a model:
//! - **Tokens**: prompt token counting
//! - **Pricing**: merged price tables, projected cost, affordable fallbacks
//! - **Candidates**: per-task candidate lists with tenant overrides
//! - **Feedback**: reward-driven model selection
//! - **Reward**: the scalar signal fed back after each request

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc, clippy::cast_precision_loss)]

pub mod candidates;
pub mod error;
pub mod feedback;
pub mod pricing;
pub mod reward;
pub mod tokens;

pub use candidates::CandidateMap;
pub use error::RoutingError;
pub use feedback::{FeedbackSelector, ModelSelector, RewardStats};
pub use pricing::PriceTable;
pub use reward::RewardModel;
pub use tokens::{HeuristicCounter, TiktokenCounter, TokenCounter, counter_for};
