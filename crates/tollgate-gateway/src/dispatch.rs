use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tollgate_batch::{BatchDispatch, BatchError};
use tollgate_core::BatchKey;
use tollgate_llm::{Backend, Executor, LlmError};

/// One batch member's answer
#[derive(Debug, Clone)]
pub struct BatchedChoice {
    pub text: String,
    pub backend: Backend,
}

/// Sends coalesced prompts through the executor as one call
pub struct ExecutorDispatch {
    executor: Arc<Executor>,
    provider: Option<Value>,
}

impl ExecutorDispatch {
    /// Dispatcher sending `provider` with every batch
    pub const fn new(executor: Arc<Executor>, provider: Option<Value>) -> Self {
        Self { executor, provider }
    }
}

#[async_trait]
impl BatchDispatch for ExecutorDispatch {
    type Item = String;
    type Output = BatchedChoice;
    type Error = LlmError;

    async fn dispatch(&self, key: &BatchKey, items: Vec<String>) -> Result<Vec<BatchedChoice>, LlmError> {
        let reply = self
            .executor
            .execute_batch(&key.model, &items, self.provider.as_ref())
            .await?;
        let backend = reply.backend;

        if reply.choices.len() < items.len() {
            tracing::warn!(
                batch = %key,
                sent = items.len(),
                received = reply.choices.len(),
                "upstream answered part of the batch"
            );
        }

        Ok(reply
            .choices
            .into_iter()
            .map(|text| BatchedChoice { text, backend })
            .collect())
    }
}

/// Fold a batch failure into the executor's error type
pub fn batch_failure(err: BatchError<LlmError>) -> LlmError {
    match err {
        BatchError::Dispatch(err) => err,
        BatchError::MissingResponse => LlmError::InvalidResponse("no response in batch".to_owned()),
        BatchError::Dropped => LlmError::Transport("batch was dropped before it completed".to_owned()),
    }
}
