//! Request execution for Tollgate
//!
//! Sends prompts to an OpenAI-compatible aggregation API or a local
//! inference server, with bounded retries for transient failures and a
//! single compressed retry when the prompt overflows the model's context.
//! Without any backend configured, responses are synthesized offline.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc, clippy::cast_precision_loss)]

pub mod client;
pub mod compress;
pub mod error;
pub mod executor;
pub mod types;

pub use client::{OpenAiCompatibleClient, UpstreamClient};
pub use compress::{Compressed, CompressionInfo, PromptCompressor, TruncatingCompressor};
pub use error::{LlmError, classify_http};
pub use executor::{Backend, BatchReply, Execution, Executor, RetryPolicy, offline_response};
pub use types::{ChatMessage, UpstreamPayload, UpstreamReply};
