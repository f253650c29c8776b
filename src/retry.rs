//! Retry policy: bounded backoff with jitter.
//!
//! Pure decision logic mapping a transport outcome plus an event's attempt
//! history to what the scheduler should do next. The policy never inspects
//! transport-specific status codes, only the
//! [`TransportOutcome`](crate::transport::TransportOutcome) classification.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::transport::TransportOutcome;

/// Retry policy configuration for failed deliveries.
///
/// Backoff grows with the event's retry count but is hard-capped at
/// `retry_deadline`, so a long-failing head event never waits more than
/// one deadline between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Base delay for backoff calculation.
    pub base_delay: Duration,

    /// Upper bound on any computed retry delay.
    pub retry_deadline: Duration,

    /// Jitter percentage (0.0 to 1.0) to add randomness.
    pub jitter_factor: f64,

    /// Strategy for growing delays across attempts.
    pub backoff_strategy: BackoffStrategy,

    /// Failed attempts after which the event is parked instead of
    /// rescheduled. `None` retries indefinitely; a parked event stays in
    /// the store and is revisited on the next external trigger.
    pub max_auto_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            retry_deadline: Duration::from_secs(60),
            jitter_factor: 0.25, // ±25% randomization
            backoff_strategy: BackoffStrategy::Exponential,
            max_auto_retries: None,
        }
    }
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Delay doubles with each failed attempt.
    Exponential,
    /// Delay increases by the base amount each attempt.
    Linear,
}

/// What the scheduler should do after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Terminal success; remove the event.
    Success,
    /// Reschedule the same event after the given delay.
    Retry {
        /// Delay before the next attempt
        after: Duration,
    },
    /// Stop auto-retrying but keep the event persisted until the next
    /// external trigger revisits it.
    Park,
    /// Permanent client-side rejection; remove the event without retry.
    Drop,
}

impl RetryPolicy {
    /// Decides the disposition of an event after one transport attempt.
    ///
    /// `retry_count` is the number of failed attempts so far (before this
    /// one is recorded). Each retryable failure pays the full computed
    /// backoff for its attempt number; consecutive failures wait
    /// progressively longer.
    pub fn decide(&self, outcome: TransportOutcome, retry_count: u32) -> RetryDecision {
        match outcome {
            TransportOutcome::Success => RetryDecision::Success,
            TransportOutcome::PermanentClientError => RetryDecision::Drop,
            TransportOutcome::RetryableServerError | TransportOutcome::RetryableNetworkError => {
                if let Some(max) = self.max_auto_retries {
                    if retry_count >= max {
                        return RetryDecision::Park;
                    }
                }

                RetryDecision::Retry { after: self.delay_for(retry_count) }
            },
        }
    }

    /// Computes the backoff delay for an event with `retry_count` prior
    /// failures. Jittered and capped at `retry_deadline` on both sides of
    /// the jitter.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let base_delay = match self.backoff_strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay * retry_count.saturating_add(1),
            BackoffStrategy::Exponential => {
                let multiplier = 2_u32.saturating_pow(retry_count.min(20));
                self.base_delay * multiplier
            },
        };

        let capped_delay = std::cmp::min(base_delay, self.retry_deadline);
        let jittered_delay = apply_jitter(capped_delay, self.jitter_factor);

        std::cmp::min(jittered_delay, self.retry_deadline)
    }
}

/// Applies jitter to a duration to spread retry timing.
///
/// Randomizes the delay by ±`jitter_factor` percentage. With a factor of
/// 0.25, a 10s delay becomes 7.5s to 12.5s.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}
