//! Shared helpers for integration tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use tracklane::{
    transport::mock::MockTransport, EngineConfig, GuaranteedDeliveryEngine, InMemoryEventStore,
    RetryPolicy, TestClock,
};

/// Deterministic retry policy used across scenario tests.
pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_secs(1),
        retry_deadline: Duration::from_secs(3),
        jitter_factor: 0.0,
        ..Default::default()
    }
}

/// Engine over an in-memory store, a scripted transport, and a test
/// clock. The clock handle is returned for elapsed-time assertions.
pub fn test_engine(
    transport: MockTransport,
    policy: RetryPolicy,
) -> (GuaranteedDeliveryEngine, Arc<TestClock>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,tracklane=debug")),
        )
        .with_test_writer()
        .try_init();

    let clock = Arc::new(TestClock::new());
    let config =
        EngineConfig::new("scenario-app", "api.example.com").unwrap().with_retry_policy(policy);
    let engine = GuaranteedDeliveryEngine::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(transport),
        config,
        clock.clone(),
    );
    (engine, clock)
}

/// Polls until the engine's queue is empty, failing after 5s of real time.
pub async fn wait_until_drained(engine: &GuaranteedDeliveryEngine) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if engine.pending_count().await.unwrap() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("queue not drained within 5s");
}

/// Polls until the transport has seen at least `at_least` sends.
pub async fn wait_until_sends(transport: &MockTransport, at_least: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if transport.send_count().await >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("expected transport sends not observed within 5s");
}
