//! Tracking event model.
//!
//! A [`TrackingEvent`] is the unit of guaranteed delivery: an opaque
//! payload plus the bookkeeping the engine needs to order attempts and
//! pace retries. The store is the sole owner of persisted instances; the
//! worker mutates only the bookkeeping fields.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tracking event, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A pending tracking event awaiting delivery.
///
/// Serialized as `{id, payload, enqueued_at (epoch millis), retry_count,
/// last_attempt_at (nullable epoch millis)}` — the only on-disk layout the
/// file-backed store uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// Primary key in the store, generated at enqueue time.
    pub id: EventId,

    /// Opaque body handed unmodified to the transport.
    pub payload: Bytes,

    /// Wall-clock time of creation; defines delivery order, oldest first.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub enqueued_at: DateTime<Utc>,

    /// Failed attempt counter. Only ever increases while the event is
    /// stored.
    pub retry_count: u32,

    /// Time of the most recent attempt, if any.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl TrackingEvent {
    /// Creates a new event enqueued at `now` with a fresh identifier.
    pub fn new(payload: Bytes, now: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            payload,
            enqueued_at: now,
            retry_count: 0,
            last_attempt_at: None,
        }
    }

    /// Age of the event in milliseconds at `now`.
    ///
    /// Reported to the transport alongside the payload so the server can
    /// account for client-side queueing delay.
    pub fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        (now - self.enqueued_at).num_milliseconds()
    }
}
