//! Delivery worker: performs one attempt against the head event.
//!
//! The worker holds no cross-attempt state. One attempt is: transport
//! call → retry-policy decision → store mutation, with `NotFound` races
//! (concurrent purge) tolerated throughout.

use std::{sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    engine::EngineStats,
    error::Result,
    event::TrackingEvent,
    retry::{RetryDecision, RetryPolicy},
    store::EventStore,
    time::Clock,
    transport::Transport,
};

/// Result of one delivery attempt, reported to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Terminal success; the event was removed.
    Delivered,
    /// Permanent rejection; the event was removed without retry.
    Dropped,
    /// Retryable failure; the scheduler should arm a timer for the delay.
    Retry(Duration),
    /// Retryable failure past the auto-retry budget; the event stays
    /// stored, no timer is armed.
    Parked,
}

/// Performs single delivery attempts on behalf of the scheduler.
pub struct DeliveryWorker {
    store: Arc<dyn EventStore>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<EngineStats>>,
}

impl DeliveryWorker {
    /// Creates a worker over the shared store and transport.
    pub fn new(
        store: Arc<dyn EventStore>,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
        stats: Arc<RwLock<EngineStats>>,
    ) -> Self {
        Self { store, transport, policy, clock, stats }
    }

    /// Attempts delivery of one event.
    ///
    /// Side effects are confined to the single transport call and the
    /// resulting store mutation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`](crate::error::EngineError) if the
    /// store mutation fails; `NotFound` races are swallowed.
    pub async fn attempt(&self, mut event: TrackingEvent) -> Result<AttemptOutcome> {
        let attempt_number = event.retry_count + 1;
        let now = self.clock.now_utc();

        debug!(
            event_id = %event.id,
            attempt_number,
            age_millis = event.age_millis(now),
            "attempting event delivery"
        );

        let outcome = self.transport.send(event.payload.clone(), event.age_millis(now)).await;

        let attempted_at = self.clock.now_utc();
        let decision = self.policy.decide(outcome, event.retry_count);

        {
            let mut stats = self.stats.write().await;
            stats.attempts_made += 1;
        }

        match decision {
            RetryDecision::Success => {
                self.remove_tolerant(&event).await?;
                self.stats.write().await.delivered += 1;
                info!(event_id = %event.id, attempt_number, "event delivered");
                Ok(AttemptOutcome::Delivered)
            },
            RetryDecision::Drop => {
                self.remove_tolerant(&event).await?;
                self.stats.write().await.dropped += 1;
                error!(
                    event_id = %event.id,
                    attempt_number,
                    "event rejected permanently, dropped without retry"
                );
                Ok(AttemptOutcome::Dropped)
            },
            RetryDecision::Retry { after } => {
                event.retry_count += 1;
                event.last_attempt_at = Some(attempted_at);
                self.update_tolerant(&event).await?;
                self.stats.write().await.retries_scheduled += 1;
                warn!(
                    event_id = %event.id,
                    attempt_number,
                    retry_in_ms = after.as_millis(),
                    "delivery failed, retry scheduled"
                );
                Ok(AttemptOutcome::Retry(after))
            },
            RetryDecision::Park => {
                event.retry_count += 1;
                event.last_attempt_at = Some(attempted_at);
                self.update_tolerant(&event).await?;
                self.stats.write().await.parked += 1;
                warn!(
                    event_id = %event.id,
                    attempt_number,
                    "auto-retry budget exhausted, event parked until next trigger"
                );
                Ok(AttemptOutcome::Parked)
            },
        }
    }

    /// Removes the event, tolerating a concurrent purge.
    async fn remove_tolerant(&self, event: &TrackingEvent) -> Result<()> {
        match self.store.remove(event.id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_benign() => {
                debug!(event_id = %event.id, "event already gone, remove skipped");
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    /// Persists attempt bookkeeping, tolerating a concurrent purge.
    async fn update_tolerant(&self, event: &TrackingEvent) -> Result<()> {
        match self.store.update(event.clone()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_benign() => {
                debug!(event_id = %event.id, "event purged mid-attempt, bookkeeping skipped");
                Ok(())
            },
            Err(e) => Err(e),
        }
    }
}
