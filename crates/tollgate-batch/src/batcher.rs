use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tollgate_config::BatchingConfig;
use tollgate_core::BatchKey;

use crate::{BatchDispatch, BatchError};

type Reply<D> = oneshot::Sender<
    Result<<D as BatchDispatch>::Output, BatchError<<D as BatchDispatch>::Error>>,
>;

/// Flush thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub wait: Duration,
    pub max_wait: Duration,
}

impl From<&BatchingConfig> for BatchSettings {
    fn from(config: &BatchingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            wait: Duration::from_millis(config.wait_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
        }
    }
}

/// The open batch for one key
struct OpenBatch<D: BatchDispatch> {
    /// Bumped on every flush so stale timers can tell they lost the race
    generation: u64,
    opened_at: Option<Instant>,
    timer_armed: bool,
    members: Vec<(D::Item, Reply<D>)>,
}

impl<D: BatchDispatch> OpenBatch<D> {
    fn new() -> Self {
        Self {
            generation: 0,
            opened_at: None,
            timer_armed: false,
            members: Vec::new(),
        }
    }

    /// Close the current batch and reopen an empty one
    fn take(&mut self) -> Vec<(D::Item, Reply<D>)> {
        self.generation += 1;
        self.opened_at = None;
        self.timer_armed = false;
        mem::take(&mut self.members)
    }
}

struct Slot<D: BatchDispatch> {
    open: Mutex<OpenBatch<D>>,
    /// Held while a flushed batch is being dispatched
    in_flight: tokio::sync::Mutex<()>,
}

struct Inner<D: BatchDispatch> {
    dispatcher: D,
    settings: BatchSettings,
    slots: DashMap<BatchKey, Arc<Slot<D>>>,
}

/// Coalesces same-key requests into batched upstream calls
pub struct Batcher<D: BatchDispatch> {
    inner: Arc<Inner<D>>,
}

impl<D: BatchDispatch> Clone for Batcher<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

enum Action {
    Flush(&'static str),
    ArmTimer(u64),
    Wait,
}

impl<D: BatchDispatch> Batcher<D> {
    pub fn new(dispatcher: D, settings: BatchSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                settings,
                slots: DashMap::new(),
            }),
        }
    }

    /// Add a request to the open batch for `key` and wait for its output
    ///
    /// Dropping the returned future abandons only this member; the batch it
    /// joined is still dispatched for everyone else.
    pub async fn submit(&self, key: BatchKey, item: D::Item) -> Result<D::Output, BatchError<D::Error>> {
        let (tx, rx) = oneshot::channel();
        let slot = self.inner.slot(&key);

        let (action, batch) = {
            let mut open = slot.open.lock().unwrap_or_else(PoisonError::into_inner);
            let opened_at = *open.opened_at.get_or_insert_with(Instant::now);
            open.members.push((item, tx));

            if open.members.len() >= self.inner.settings.batch_size {
                (Action::Flush("size"), open.take())
            } else if opened_at.elapsed() >= self.inner.settings.max_wait {
                (Action::Flush("max_wait"), open.take())
            } else if open.timer_armed {
                (Action::Wait, Vec::new())
            } else {
                open.timer_armed = true;
                (Action::ArmTimer(open.generation), Vec::new())
            }
        };

        match action {
            Action::Flush(reason) => {
                tokio::spawn(Arc::clone(&self.inner).flush(key, slot, batch, reason));
            }
            Action::ArmTimer(generation) => {
                tokio::spawn(Arc::clone(&self.inner).flush_after_wait(key, slot, generation));
            }
            Action::Wait => {}
        }

        rx.await.unwrap_or(Err(BatchError::Dropped))
    }

    /// Keys with a slot allocated
    pub fn key_count(&self) -> usize {
        self.inner.slots.len()
    }
}

impl<D: BatchDispatch> Inner<D> {
    fn slot(&self, key: &BatchKey) -> Arc<Slot<D>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        let slot = self.slots.entry(key.clone()).or_insert_with(|| {
            Arc::new(Slot {
                open: Mutex::new(OpenBatch::new()),
                in_flight: tokio::sync::Mutex::new(()),
            })
        });
        Arc::clone(slot.value())
    }

    async fn flush_after_wait(self: Arc<Self>, key: BatchKey, slot: Arc<Slot<D>>, generation: u64) {
        tokio::time::sleep(self.settings.wait.min(self.settings.max_wait)).await;

        let batch = {
            let mut open = slot.open.lock().unwrap_or_else(PoisonError::into_inner);
            // A size flush already closed the batch this timer was armed for
            if open.generation != generation || open.members.is_empty() {
                return;
            }
            open.take()
        };

        self.flush(key, slot, batch, "timeout").await;
    }

    async fn flush(
        self: Arc<Self>,
        key: BatchKey,
        slot: Arc<Slot<D>>,
        batch: Vec<(D::Item, Reply<D>)>,
        reason: &'static str,
    ) {
        let _in_flight = slot.in_flight.lock().await;

        let size = batch.len();
        let (items, replies): (Vec<_>, Vec<_>) = batch.into_iter().unzip();

        tracing::info!(batch_key = %key, size, reason, "flushing batch");

        match self.dispatcher.dispatch(&key, items).await {
            Ok(outputs) => {
                if outputs.len() > size {
                    tracing::warn!(batch_key = %key, expected = size, received = outputs.len(), "upstream returned extra batch outputs");
                }
                if outputs.len() < size {
                    tracing::warn!(batch_key = %key, expected = size, received = outputs.len(), "upstream returned partial batch");
                }

                let mut outputs = outputs.into_iter();
                for reply in replies {
                    let result = outputs.next().ok_or(BatchError::MissingResponse);
                    // The caller may have given up; that only affects its own slot
                    let _ = reply.send(result);
                }
            }
            Err(e) => {
                tracing::warn!(batch_key = %key, size, "batch dispatch failed");
                for reply in replies {
                    let _ = reply.send(Err(BatchError::Dispatch(e.clone())));
                }
            }
        }
    }
}
