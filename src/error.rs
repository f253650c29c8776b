//! Error types for the delivery engine.
//!
//! Defines the error taxonomy shared by the event store, the delivery
//! worker, and the engine surface. Transport results are never errors:
//! they are classified outcomes consumed by the retry policy, so only
//! storage and configuration problems surface here.

use thiserror::Error;

use crate::event::EventId;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error type for delivery engine operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The underlying storage medium is unusable (disk full, corrupted
    /// snapshot, unwritable path). Surfaced to the host; the delivery
    /// lane pauses until the store recovers.
    #[error("storage fault: {message}")]
    Storage {
        /// Description of the storage failure
        message: String,
    },

    /// The targeted event no longer exists in the store. A benign race
    /// with a concurrent purge; callers on the delivery path swallow it.
    #[error("event {id} not found")]
    NotFound {
        /// Identifier of the missing event
        id: EventId,
    },

    /// Invalid endpoint/domain/identity supplied at construction time.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Description of the rejected value
        message: String,
    },

    /// The engine was asked to shut down.
    #[error("engine shutdown requested")]
    Shutdown,
}

impl EngineError {
    /// Creates a storage fault from a message.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Creates a not-found error for an event id.
    pub fn not_found(id: EventId) -> Self {
        Self::NotFound { id }
    }

    /// Creates a configuration error from a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Returns `true` for errors that are tolerated on the delivery path.
    ///
    /// `NotFound` only ever means the event was purged between the
    /// attempt starting and its bookkeeping landing, which must not abort
    /// the lane.
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
