use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tollgate_config::CacheWriterConfig;

use crate::SemanticCache;

/// Semantic cache entry waiting to be written
#[derive(Debug, Clone)]
pub struct SemanticWrite {
    pub prompt: String,
    pub model: String,
    pub namespace: String,
    pub text: String,
}

/// Bounded background writer for the semantic tier
///
/// A fixed number of workers drain a bounded queue. When the queue is full
/// new writes are dropped with a warning instead of spawning more tasks.
/// Workers stop when the shutdown token is cancelled.
#[derive(Clone)]
pub struct CacheWriter {
    tx: mpsc::Sender<SemanticWrite>,
}

impl CacheWriter {
    /// Spawn the worker pool
    #[must_use]
    pub fn spawn(cache: Arc<dyn SemanticCache>, config: &CacheWriterConfig, shutdown: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..config.workers.max(1) {
            tokio::spawn(run_worker(worker, Arc::clone(&rx), Arc::clone(&cache), shutdown.clone()));
        }

        Self { tx }
    }

    /// Enqueue a write without waiting; returns whether it was accepted
    pub fn enqueue(&self, write: SemanticWrite) -> bool {
        match self.tx.try_send(write) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(write)) => {
                tracing::warn!(model = %write.model, namespace = %write.namespace, "semantic cache write queue full, dropping write");
                false
            }
            Err(mpsc::error::TrySendError::Closed(write)) => {
                tracing::warn!(model = %write.model, "semantic cache writer stopped, dropping write");
                false
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<SemanticWrite>>>,
    cache: Arc<dyn SemanticCache>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => None,
            write = async { rx.lock().await.recv().await } => write,
        };

        let Some(write) = next else {
            tracing::debug!(worker, "semantic cache writer stopping");
            return;
        };

        if let Err(e) = cache.store(&write.prompt, &write.model, &write.namespace, &write.text).await {
            tracing::warn!(error = %e, model = %write.model, "semantic cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::{CacheError, MemorySemanticCache, SemanticHit};

    fn write(text: &str) -> SemanticWrite {
        SemanticWrite {
            prompt: format!("prompt about {text}"),
            model: "m".to_owned(),
            namespace: "default".to_owned(),
            text: text.to_owned(),
        }
    }

    #[tokio::test]
    async fn writes_reach_the_cache() {
        let cache = Arc::new(MemorySemanticCache::new(0.85, 10, Duration::from_secs(60)));
        let writer = CacheWriter::spawn(cache.clone(), &CacheWriterConfig::default(), CancellationToken::new());

        assert!(writer.enqueue(write("rust")));

        tokio::time::timeout(Duration::from_secs(5), async {
            while cache.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("write was not applied");
    }

    /// Blocks every store until released
    struct Stalled {
        release: Notify,
    }

    #[async_trait]
    impl SemanticCache for Stalled {
        async fn lookup(&self, _: &str, _: &str, _: &str) -> Result<Option<SemanticHit>, CacheError> {
            Ok(None)
        }

        async fn store(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), CacheError> {
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn full_queue_drops_writes() {
        let cache = Arc::new(Stalled { release: Notify::new() });
        let config = CacheWriterConfig {
            workers: 1,
            queue_capacity: 1,
        };
        let writer = CacheWriter::spawn(cache, &config, CancellationToken::new());

        // First write is picked up by the stalled worker, second fills the queue
        assert!(writer.enqueue(write("a")));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(writer.enqueue(write("b")));
        assert!(!writer.enqueue(write("c")));
    }

    #[tokio::test]
    async fn cancelled_writer_stops_accepting() {
        let cache = Arc::new(MemorySemanticCache::new(0.85, 10, Duration::from_secs(60)));
        let shutdown = CancellationToken::new();
        let writer = CacheWriter::spawn(cache, &CacheWriterConfig::default(), shutdown.clone());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), async {
            while writer.enqueue(write("late")) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("writer kept accepting after shutdown");
    }
}
