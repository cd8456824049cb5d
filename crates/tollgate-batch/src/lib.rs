//! Request coalescing for upstream calls
//!
//! Concurrent requests sharing a [`BatchKey`] are collected into one open
//! batch. The batch is flushed when it reaches `batch_size`, when its oldest
//! member has waited `max_wait`, or when a timer armed on the first member
//! fires after `wait`. A flush sends one upstream call and hands each member
//! the output at its own position.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod batcher;

use async_trait::async_trait;
use thiserror::Error;
use tollgate_core::BatchKey;

pub use batcher::{BatchSettings, Batcher};

/// Sends one coalesced batch upstream
#[async_trait]
pub trait BatchDispatch: Send + Sync + 'static {
    type Item: Send + 'static;
    type Output: Send + 'static;
    type Error: Clone + Send + 'static;

    /// Execute every item in one call; outputs are matched to items by position
    async fn dispatch(&self, key: &BatchKey, items: Vec<Self::Item>) -> Result<Vec<Self::Output>, Self::Error>;
}

/// Why a batch member did not get an output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError<E> {
    /// The upstream call for the whole batch failed
    #[error("batch dispatch failed: {0}")]
    Dispatch(E),

    /// The upstream answered fewer items than were sent
    #[error("no response in batch")]
    MissingResponse,

    /// The flush task went away before answering
    #[error("batch was dropped before it completed")]
    Dropped,
}
