//! Routing-specific error types

use thiserror::Error;

/// Errors that can occur while choosing a model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Neither the task nor the fallback category has candidates
    #[error("no candidate models configured for task: {task}")]
    NoCandidates { task: String },

    /// The selector returned a model outside the candidate list
    #[error("selector returned unknown model '{model}' for task: {task}")]
    UnknownSelection { task: String, model: String },
}
