//! In-memory hit store with periodic persistence
//!
//! The request path only ever calls [`HitSink::append`], which hands the hit
//! to an actor over a bounded mpsc channel and returns immediately.
//!
//! The actor keeps a 2-layer buffer:
//! - Layer 1: local Vec owned by the actor (no locks)
//! - Layer 2: shared DashMap keyed by site, drained by the persist task

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::models::{Hit, SiteId};
use crate::storage::Storage;

/// Append-only destination for validated hits
pub trait HitSink: Send + Sync {
    /// Take ownership of `hit`. Must not block the caller.
    fn append(&self, hit: Hit);
}

/// Message types for the MemStoreActor
enum ActorMessage {
    Append(Hit),
    /// Move everything to the shared buffer, then acknowledge
    Shutdown(oneshot::Sender<()>),
}

struct MemStoreActor {
    receiver: mpsc::Receiver<ActorMessage>,
    /// Layer 1
    buffer: Vec<Hit>,
    /// Layer 2
    shared_buffer: Arc<DashMap<SiteId, Vec<Hit>>>,
    fast_flush_interval: Duration,
}

impl MemStoreActor {
    async fn run(mut self) {
        let mut fast_flush_ticker = tokio::time::interval(self.fast_flush_interval);

        // Skip the first tick which fires immediately
        fast_flush_ticker.tick().await;

        loop {
            tokio::select! {
                msg = self.receiver.recv() => {
                    match msg {
                        Some(ActorMessage::Append(hit)) => self.buffer.push(hit),
                        Some(ActorMessage::Shutdown(ack)) => {
                            info!("MemStore actor received shutdown signal, flushing...");
                            self.flush_buffer_to_shared();
                            let _ = ack.send(());
                            break;
                        }
                        None => {
                            // Every MemStore handle is gone
                            warn!("MemStore actor channel closed, flushing...");
                            self.flush_buffer_to_shared();
                            break;
                        }
                    }
                }
                _ = fast_flush_ticker.tick() => {
                    self.flush_buffer_to_shared();
                }
            }
        }
    }

    /// Flush Layer 1 → Layer 2
    fn flush_buffer_to_shared(&mut self) {
        for hit in self.buffer.drain(..) {
            self.shared_buffer.entry(hit.site()).or_default().push(hit);
        }
    }
}

/// Process-wide hit sink; cheap to share behind an `Arc`
pub struct MemStore {
    actor_tx: mpsc::Sender<ActorMessage>,
    shared_buffer: Arc<DashMap<SiteId, Vec<Hit>>>,
}

impl MemStore {
    /// Create a store and spawn its actor on the current tokio runtime
    pub fn new_with_config(buffer_size: usize, fast_flush_interval_ms: u64) -> Self {
        let (actor_tx, actor_rx) = mpsc::channel(buffer_size);
        let shared_buffer = Arc::new(DashMap::new());

        let actor = MemStoreActor {
            receiver: actor_rx,
            buffer: Vec::new(),
            shared_buffer: Arc::clone(&shared_buffer),
            fast_flush_interval: Duration::from_millis(fast_flush_interval_ms),
        };

        tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            actor_tx,
            shared_buffer,
        }
    }

    pub fn new() -> Self {
        Self::new_with_config(
            100_000, // 100k hit buffer
            100,     // 100ms fast flush interval
        )
    }

    /// Remove and return every hit that reached the shared buffer
    pub fn drain(&self) -> Vec<Hit> {
        let sites: Vec<SiteId> = self.shared_buffer.iter().map(|e| *e.key()).collect();

        let mut result = Vec::new();
        for site in sites {
            if let Some((_, mut hits)) = self.shared_buffer.remove(&site) {
                result.append(&mut hits);
            }
        }
        result
    }

    /// Number of hits waiting in the shared buffer
    pub fn len(&self) -> usize {
        self.shared_buffer.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the shared buffer into `storage`
    pub async fn persist(&self, storage: &dyn Storage) -> anyhow::Result<u64> {
        let hits = self.drain();
        if hits.is_empty() {
            return Ok(0);
        }

        debug!("Persisting {} hits", hits.len());
        match storage.persist_hits(&hits).await {
            Ok(n) => Ok(n),
            Err(e) => {
                error!(dropped = hits.len(), error = %e, "failed to persist hits");
                Err(e)
            }
        }
    }

    /// Spawn a task persisting the shared buffer every `interval_secs`
    pub fn start_persist_task(
        self: &Arc<Self>,
        interval_secs: u64,
        storage: Arc<dyn Storage>,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

            loop {
                interval.tick().await;
                if store.actor_tx.is_closed() {
                    info!("MemStore persist task shutting down");
                    break;
                }
                let _ = store.persist(storage.as_ref()).await;
            }
        })
    }

    /// Stop accepting hits and wait until buffered hits reach the shared
    /// buffer. Call [`MemStore::persist`] afterwards to write them out.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.actor_tx.send(ActorMessage::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HitSink for MemStore {
    fn append(&self, hit: Hit) {
        if self.actor_tx.try_send(ActorMessage::Append(hit)).is_err() {
            warn!("Hit buffer full or closed, dropping hit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn hit(site: SiteId, path: &str) -> Hit {
        let mut hit = Hit::new(site, "192.0.2.1".to_string(), "test".to_string(), Utc::now());
        hit.path = path.to_string();
        hit
    }

    #[tokio::test]
    async fn test_append_then_shutdown_drains_everything() {
        let store = MemStore::new_with_config(100, 10_000);

        store.append(hit(1, "/a"));
        store.append(hit(1, "/b"));
        store.append(hit(2, "/c"));
        store.shutdown().await;

        assert_eq!(store.len(), 3);
        let mut paths: Vec<String> = store.drain().into_iter().map(|h| h.path).collect();
        paths.sort();
        assert_eq!(paths, ["/a", "/b", "/c"]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_actor_exits_when_store_is_dropped() {
        let store = MemStore::new_with_config(100, 10_000);
        let shared = Arc::clone(&store.shared_buffer);

        store.append(hit(1, "/a"));
        drop(store);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The actor flushed on its way out and released its handle
        assert_eq!(shared.get(&1).map(|hits| hits.len()), Some(1));
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[tokio::test]
    async fn test_fast_flush_moves_hits_to_shared_buffer() {
        let store = MemStore::new_with_config(100, 10);

        store.append(hit(1, "/a"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_instead_of_blocking() {
        // One-slot channel: anything arriving while the slot is taken is dropped
        let store = MemStore::new_with_config(1, 10_000);

        for i in 0..50 {
            store.append(hit(1, &format!("/{i}")));
        }
        store.shutdown().await;

        let n = store.drain().len();
        assert!((1..=50).contains(&n));
    }

    #[tokio::test]
    async fn test_append_after_shutdown_is_dropped() {
        let store = MemStore::new_with_config(10, 10_000);
        store.shutdown().await;

        store.append(hit(1, "/late"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.is_empty());
    }
}
