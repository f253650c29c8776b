//! Durable, ordered, at-least-once delivery of tracking events.
//!
//! Tracklane is an embeddable guaranteed-delivery engine: host
//! applications enqueue opaque tracking payloads which must eventually
//! reach a remote endpoint across process restarts, network loss, and
//! server errors, in the order they were enqueued.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐ enqueue ┌────────────┐ notify ┌─────────────────┐
//! │ Producer │────────▶│ EventStore │───────▶│ Delivery lane   │
//! └──────────┘         │ (durable,  │        │ idle/delivering │
//!                      │  ordered)  │◀───────│ + retry timer   │
//!                      └────────────┘ mutate └─────────────────┘
//!                                                     │
//!                                                     ▼
//!                                              ┌────────────┐
//!                                              │ Transport  │
//!                                              └────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **At-least-once**: an event leaves the store only on a terminal
//!   outcome (server acknowledgment or permanent rejection).
//! - **Ordered**: attempts run strictly oldest-first; a retrying head
//!   event blocks newer events (head-of-line semantics).
//! - **Single lane**: at most one delivery attempt is in flight at any
//!   instant, system-wide.
//! - **Bounded pacing**: retry backoff grows with the failure count but
//!   never exceeds the configured retry deadline.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use tracklane::{
//!     EngineConfig, FileEventStore, GuaranteedDeliveryEngine, SystemClock,
//! };
//!
//! # async fn example() -> tracklane::Result<()> {
//! let store = Arc::new(FileEventStore::open("events.json").await?);
//! let config = EngineConfig::new("app-ios", "api.example.com")?;
//! let mut engine =
//!     GuaranteedDeliveryEngine::with_http_transport(store, config, Arc::new(SystemClock))?;
//!
//! engine.start().await?;
//! engine.enqueue(Bytes::from_static(br#"{"action":"open"}"#)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod retry;
pub mod store;
pub mod time;
pub mod transport;
mod worker;

pub use config::EngineConfig;
pub use engine::{EngineState, EngineStats, GuaranteedDeliveryEngine};
pub use error::{EngineError, Result};
pub use event::{EventId, TrackingEvent};
pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy};
pub use store::{EventStore, FileEventStore, InMemoryEventStore};
pub use time::{Clock, SystemClock, TestClock};
pub use transport::{HttpTransport, Transport, TransportOutcome};
