//! Persistent event store: the durable, ordered queue of pending events.
//!
//! The store is the only source of truth for what still needs delivery.
//! [`EventStore`] abstracts the persistence medium behind boxed-future
//! methods so the engine owns exactly one store instance regardless of
//! backing: [`InMemoryEventStore`] for tests and ephemeral hosts,
//! [`FileEventStore`] for durability across process restarts.
//!
//! Ordering invariant: events are kept in strict `enqueued_at` order with
//! ties broken by insertion sequence; `oldest_pending` is deterministic
//! between mutations.

use std::{future::Future, path::PathBuf, pin::Pin};

use tokio::sync::RwLock;

use crate::{
    error::{EngineError, Result},
    event::{EventId, TrackingEvent},
};

/// Durable, order-preserving collection of pending events.
///
/// Mutations are serialized (single writer at a time); reads may run
/// concurrently with each other but are serialized with writers.
pub trait EventStore: Send + Sync + 'static {
    /// Appends an event durably.
    ///
    /// Fails with [`EngineError::Storage`] if the medium is unavailable;
    /// the event is then considered lost for this attempt.
    fn enqueue(
        &self,
        event: TrackingEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Returns the earliest-ordered event still present, or `None`.
    fn oldest_pending(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TrackingEvent>>> + Send + '_>>;

    /// Persists mutated bookkeeping fields for an existing event.
    ///
    /// Fails with [`EngineError::NotFound`] if the id no longer exists
    /// (race with a concurrent purge).
    fn update(
        &self,
        event: TrackingEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Removes an event. Idempotent: removing an absent id is a no-op.
    fn remove(&self, id: EventId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Number of pending events.
    fn count(&self) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + '_>>;

    /// Removes every pending event. Atomic with respect to concurrent
    /// enqueues.
    fn erase_all(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Whether the store holds no pending events.
    fn is_empty(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        let count = self.count();
        Box::pin(async move { Ok(count.await? == 0) })
    }
}

/// Inserts preserving `enqueued_at` order, ties after existing entries.
fn insert_ordered(events: &mut Vec<TrackingEvent>, event: TrackingEvent) {
    let pos = events.partition_point(|e| e.enqueued_at <= event.enqueued_at);
    events.insert(pos, event);
}

/// In-memory event store.
///
/// Not durable across restarts; used by tests and hosts that accept
/// losing the queue on process exit.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<TrackingEvent>>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn enqueue(
        &self,
        event: TrackingEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            insert_ordered(&mut *self.events.write().await, event);
            Ok(())
        })
    }

    fn oldest_pending(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TrackingEvent>>> + Send + '_>> {
        Box::pin(async move { Ok(self.events.read().await.first().cloned()) })
    }

    fn update(
        &self,
        event: TrackingEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut events = self.events.write().await;
            match events.iter_mut().find(|e| e.id == event.id) {
                Some(stored) => {
                    *stored = event;
                    Ok(())
                },
                None => Err(EngineError::not_found(event.id)),
            }
        })
    }

    fn remove(&self, id: EventId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.events.write().await.retain(|e| e.id != id);
            Ok(())
        })
    }

    fn count(&self) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + '_>> {
        Box::pin(async move { Ok(self.events.read().await.len()) })
    }

    fn erase_all(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.events.write().await.clear();
            Ok(())
        })
    }
}

/// File-backed event store persisting a JSON snapshot of the queue.
///
/// Every mutation rewrites the snapshot through a temp file plus atomic
/// rename, so a crash mid-write never truncates the queue. Snapshot size
/// is bounded by the pending backlog, which stays small in practice for a
/// client-side tracking queue.
#[derive(Debug)]
pub struct FileEventStore {
    path: PathBuf,
    events: RwLock<Vec<TrackingEvent>>,
}

impl FileEventStore {
    /// Opens (or creates) the store at `path`, loading any existing
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the snapshot exists but cannot
    /// be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let events = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<TrackingEvent>>(&bytes).map_err(|e| {
                EngineError::storage(format!("corrupted snapshot {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(EngineError::storage(format!(
                    "cannot read snapshot {}: {e}",
                    path.display()
                )))
            },
        };

        Ok(Self { path, events: RwLock::new(events) })
    }

    /// Writes the current queue to disk. Caller must hold the write lock.
    async fn persist(&self, events: &[TrackingEvent]) -> Result<()> {
        let bytes = serde_json::to_vec(events)
            .map_err(|e| EngineError::storage(format!("snapshot encode failed: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            EngineError::storage(format!("cannot write snapshot {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            EngineError::storage(format!("cannot commit snapshot {}: {e}", self.path.display()))
        })
    }
}

impl EventStore for FileEventStore {
    fn enqueue(
        &self,
        event: TrackingEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut events = self.events.write().await;
            insert_ordered(&mut events, event);
            self.persist(&events).await
        })
    }

    fn oldest_pending(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TrackingEvent>>> + Send + '_>> {
        Box::pin(async move { Ok(self.events.read().await.first().cloned()) })
    }

    fn update(
        &self,
        event: TrackingEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut events = self.events.write().await;
            let Some(stored) = events.iter_mut().find(|e| e.id == event.id) else {
                return Err(EngineError::not_found(event.id));
            };
            *stored = event;
            self.persist(&events).await
        })
    }

    fn remove(&self, id: EventId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut events = self.events.write().await;
            let before = events.len();
            events.retain(|e| e.id != id);
            if events.len() == before {
                // Absent id: keep idempotent, skip the disk write
                return Ok(());
            }
            self.persist(&events).await
        })
    }

    fn count(&self) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + '_>> {
        Box::pin(async move { Ok(self.events.read().await.len()) })
    }

    fn erase_all(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut events = self.events.write().await;
            events.clear();
            self.persist(&events).await
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn event_at(millis: i64) -> TrackingEvent {
        TrackingEvent::new(
            Bytes::from_static(b"{}"),
            Utc.timestamp_millis_opt(millis).single().unwrap(),
        )
    }

    #[tokio::test]
    async fn oldest_pending_follows_enqueue_order() {
        let store = InMemoryEventStore::new();
        let first = event_at(1_000);
        let second = event_at(2_000);

        store.enqueue(second.clone()).await.unwrap();
        store.enqueue(first.clone()).await.unwrap();

        let oldest = store.oldest_pending().await.unwrap().unwrap();
        assert_eq!(oldest.id, first.id);
    }

    #[tokio::test]
    async fn equal_timestamps_keep_insertion_order() {
        let store = InMemoryEventStore::new();
        let a = event_at(1_000);
        let b = event_at(1_000);

        store.enqueue(a.clone()).await.unwrap();
        store.enqueue(b.clone()).await.unwrap();

        assert_eq!(store.oldest_pending().await.unwrap().unwrap().id, a.id);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = InMemoryEventStore::new();
        let event = event_at(1_000);
        let other = event_at(2_000);
        store.enqueue(event.clone()).await.unwrap();
        store.enqueue(other.clone()).await.unwrap();

        store.remove(event.id).await.unwrap();
        store.remove(event.id).await.unwrap();
        store.remove(EventId::new()).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.oldest_pending().await.unwrap().unwrap().id, other.id);
    }

    #[tokio::test]
    async fn update_on_missing_id_is_not_found() {
        let store = InMemoryEventStore::new();
        let event = event_at(1_000);

        let err = store.update(event.clone()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { id } if id == event.id));
    }

    #[tokio::test]
    async fn update_persists_bookkeeping() {
        let store = InMemoryEventStore::new();
        let mut event = event_at(1_000);
        store.enqueue(event.clone()).await.unwrap();

        event.retry_count = 2;
        event.last_attempt_at = Some(Utc::now());
        store.update(event.clone()).await.unwrap();

        let stored = store.oldest_pending().await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 2);
        assert!(stored.last_attempt_at.is_some());
    }

    #[tokio::test]
    async fn erase_all_empties_the_store() {
        let store = InMemoryEventStore::new();
        store.enqueue(event_at(1_000)).await.unwrap();
        store.enqueue(event_at(2_000)).await.unwrap();

        store.erase_all().await.unwrap();

        assert!(store.is_empty().await.unwrap());
    }
}
