//! Property-based tests for delivery invariants.
//!
//! Uses randomly generated inputs to verify the retry policy's bounds and
//! the engine's ordering guarantee hold across arbitrary schedules.

mod common;

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use common::{wait_until_drained, wait_until_sends};
use proptest::prelude::*;
use tracklane::{
    transport::{mock::MockTransport, TransportOutcome},
    BackoffStrategy, EngineConfig, GuaranteedDeliveryEngine, InMemoryEventStore, RetryDecision,
    RetryPolicy, TestClock,
};

fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES").ok().and_then(|s| s.parse().ok()).unwrap_or(16);
    ProptestConfig::with_cases(cases)
}

fn strategy_strategy() -> impl Strategy<Value = BackoffStrategy> {
    prop_oneof![
        Just(BackoffStrategy::Fixed),
        Just(BackoffStrategy::Linear),
        Just(BackoffStrategy::Exponential),
    ]
}

fn retryable_outcome() -> impl Strategy<Value = TransportOutcome> {
    prop_oneof![
        Just(TransportOutcome::RetryableServerError),
        Just(TransportOutcome::RetryableNetworkError),
    ]
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Backoff delays never exceed the retry deadline, no matter the
    /// strategy, failure count, or jitter.
    #[test]
    fn backoff_is_bounded_by_retry_deadline(
        base_ms in 1u64..10_000,
        deadline_ms in 1u64..120_000,
        retry_count in 0u32..64,
        jitter_factor in 0.0f64..1.0,
        strategy in strategy_strategy(),
    ) {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(base_ms),
            retry_deadline: Duration::from_millis(deadline_ms),
            jitter_factor,
            backoff_strategy: strategy,
            ..Default::default()
        };

        let delay = policy.delay_for(retry_count);
        prop_assert!(
            delay <= policy.retry_deadline,
            "delay {:?} exceeds deadline {:?}",
            delay,
            policy.retry_deadline
        );
    }

    /// Terminal outcomes never schedule a retry; retryable outcomes park
    /// exactly when the auto-retry budget is exhausted.
    #[test]
    fn decision_matches_outcome_and_budget(
        retry_count in 0u32..100,
        max_auto_retries in proptest::option::of(0u32..100),
        outcome in retryable_outcome(),
    ) {
        let policy = RetryPolicy { max_auto_retries, ..Default::default() };

        prop_assert_eq!(
            policy.decide(TransportOutcome::Success, retry_count),
            RetryDecision::Success
        );
        prop_assert_eq!(
            policy.decide(TransportOutcome::PermanentClientError, retry_count),
            RetryDecision::Drop
        );

        let decision = policy.decide(outcome, retry_count);
        match max_auto_retries {
            Some(max) if retry_count >= max => {
                prop_assert_eq!(decision, RetryDecision::Park);
            },
            _ => prop_assert!(
                matches!(decision, RetryDecision::Retry { .. }),
                "expected Retry, got {:?}",
                decision
            ),
        }
    }

    /// First attempts happen in enqueue order even when transient failures
    /// force retries along the way.
    #[test]
    fn first_attempts_follow_enqueue_order(
        payload_count in 1usize..8,
        failures in prop::collection::vec(retryable_outcome(), 0..4),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let transport = MockTransport::new();
            transport.script_outcomes(failures.clone()).await;

            let config = EngineConfig::new("prop-app", "api.example.com")
                .unwrap()
                .with_retry_policy(RetryPolicy {
                    base_delay: Duration::from_millis(10),
                    retry_deadline: Duration::from_millis(50),
                    jitter_factor: 0.0,
                    ..Default::default()
                });
            let mut engine = GuaranteedDeliveryEngine::new(
                Arc::new(InMemoryEventStore::new()),
                Arc::new(transport.clone()),
                config,
                Arc::new(TestClock::new()),
            );
            engine.start().await.unwrap();

            for i in 0..payload_count {
                engine.enqueue(Bytes::from(vec![i as u8])).await.unwrap();
            }
            wait_until_drained(&engine).await;
            wait_until_sends(&transport, payload_count + failures.len()).await;

            let sends = transport.recorded_sends().await;
            let mut first_seen = Vec::new();
            for send in &sends {
                if !first_seen.contains(&send.payload) {
                    first_seen.push(send.payload.clone());
                }
            }
            let expected: Vec<_> =
                (0..payload_count).map(|i| Bytes::from(vec![i as u8])).collect();
            assert_eq!(first_seen, expected, "first-attempt order diverged");

            engine.shutdown().await;
        });
    }
}
