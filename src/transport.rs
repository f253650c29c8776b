//! Transport seam between the engine and the network.
//!
//! The engine never sees status codes or wire errors; a transport reduces
//! every send to a [`TransportOutcome`] classification which the retry
//! policy consumes. [`HttpTransport`] is the production implementation;
//! [`mock::MockTransport`] scripts outcomes for tests.

use std::{future::Future, pin::Pin, time::Duration};

use bytes::Bytes;
use tracing::debug;

use crate::{
    config::EngineConfig,
    error::{EngineError, Result},
};

/// Classification of a single transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOutcome {
    /// The server acknowledged the event.
    Success,
    /// The server failed transiently (5xx-class); worth retrying.
    RetryableServerError,
    /// The request never completed (timeout, connection loss); worth
    /// retrying.
    RetryableNetworkError,
    /// The server rejected the event permanently (4xx-class); retrying
    /// cannot help.
    PermanentClientError,
}

impl TransportOutcome {
    /// Returns `true` when the outcome removes the event from the store.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::PermanentClientError)
    }

    /// Returns `true` when another attempt may succeed.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RetryableServerError | Self::RetryableNetworkError)
    }
}

/// A single send-and-classify network call.
///
/// Synchronous from the caller's point of view: the future resolves once
/// the attempt has a classification, after at most the configured timeout.
pub trait Transport: Send + Sync + 'static {
    /// Sends one event payload with its age in milliseconds.
    fn send(
        &self,
        payload: Bytes,
        age_millis: i64,
    ) -> Pin<Box<dyn Future<Output = TransportOutcome> + Send + '_>>;
}

/// Request header carrying the event's client-side queueing age.
pub const AGE_HEADER: &str = "x-event-age-millis";

/// HTTP transport posting events to the configured ingestion URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Builds a transport for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if the underlying HTTP
    /// client cannot be initialized.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Self::with_url(config.ingest_url(), config.transport_timeout)
    }

    /// Builds a transport posting to an explicit URL. Used by tests that
    /// point at a local mock server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if the underlying HTTP
    /// client cannot be initialized.
    pub fn with_url(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tracklane/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::configuration(format!("http client init failed: {e}")))?;

        Ok(Self { client, url })
    }

    fn classify_status(status: reqwest::StatusCode) -> TransportOutcome {
        if status.is_success() {
            TransportOutcome::Success
        } else if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            TransportOutcome::RetryableServerError
        } else if status.is_client_error() {
            TransportOutcome::PermanentClientError
        } else {
            // Redirect loops and other oddities: assume transient
            TransportOutcome::RetryableServerError
        }
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        payload: Bytes,
        age_millis: i64,
    ) -> Pin<Box<dyn Future<Output = TransportOutcome> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(AGE_HEADER, age_millis)
                .body(payload)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let outcome = Self::classify_status(response.status());
                    debug!(status = response.status().as_u16(), ?outcome, "transport response");
                    outcome
                },
                Err(error) => {
                    debug!(error = %error, "transport request failed");
                    TransportOutcome::RetryableNetworkError
                },
            }
        })
    }
}

pub mod mock {
    //! Scripted transport for deterministic tests.

    use std::{collections::VecDeque, future::Future, pin::Pin, sync::Arc};

    use bytes::Bytes;
    use tokio::sync::Mutex;

    use super::{Transport, TransportOutcome};

    /// One recorded transport call, for verification.
    #[derive(Debug, Clone)]
    pub struct RecordedSend {
        /// Payload passed to the transport.
        pub payload: Bytes,
        /// Event age reported alongside the payload.
        pub age_millis: i64,
    }

    /// Transport that replays a scripted outcome sequence.
    ///
    /// Outcomes are consumed front to back; once the script is exhausted
    /// every further send returns the default outcome. All calls are
    /// recorded in order.
    #[derive(Debug, Clone)]
    pub struct MockTransport {
        script: Arc<Mutex<VecDeque<TransportOutcome>>>,
        default_outcome: TransportOutcome,
        calls: Arc<Mutex<Vec<RecordedSend>>>,
    }

    impl MockTransport {
        /// Creates a transport answering `Success` to every send.
        pub fn new() -> Self {
            Self::with_default(TransportOutcome::Success)
        }

        /// Creates a transport with the given fallback outcome.
        pub fn with_default(default_outcome: TransportOutcome) -> Self {
            Self {
                script: Arc::new(Mutex::new(VecDeque::new())),
                default_outcome,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Appends outcomes to the script.
        pub async fn script_outcomes(&self, outcomes: impl IntoIterator<Item = TransportOutcome>) {
            self.script.lock().await.extend(outcomes);
        }

        /// Returns all sends recorded so far, in call order.
        pub async fn recorded_sends(&self) -> Vec<RecordedSend> {
            self.calls.lock().await.clone()
        }

        /// Number of sends made so far.
        pub async fn send_count(&self) -> usize {
            self.calls.lock().await.len()
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Transport for MockTransport {
        fn send(
            &self,
            payload: Bytes,
            age_millis: i64,
        ) -> Pin<Box<dyn Future<Output = TransportOutcome> + Send + '_>> {
            let script = self.script.clone();
            let calls = self.calls.clone();
            let default_outcome = self.default_outcome;

            Box::pin(async move {
                calls.lock().await.push(RecordedSend { payload, age_millis });
                script.lock().await.pop_front().unwrap_or(default_outcome)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_outcomes_identified() {
        assert!(TransportOutcome::Success.is_terminal());
        assert!(TransportOutcome::PermanentClientError.is_terminal());
        assert!(!TransportOutcome::RetryableServerError.is_terminal());
        assert!(!TransportOutcome::RetryableNetworkError.is_terminal());
    }

    #[test]
    fn status_classification() {
        use reqwest::StatusCode;

        assert_eq!(
            HttpTransport::classify_status(StatusCode::OK),
            TransportOutcome::Success
        );
        assert_eq!(
            HttpTransport::classify_status(StatusCode::BAD_REQUEST),
            TransportOutcome::PermanentClientError
        );
        assert_eq!(
            HttpTransport::classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            TransportOutcome::RetryableServerError
        );
        assert_eq!(
            HttpTransport::classify_status(StatusCode::TOO_MANY_REQUESTS),
            TransportOutcome::RetryableServerError
        );
        assert_eq!(
            HttpTransport::classify_status(StatusCode::REQUEST_TIMEOUT),
            TransportOutcome::RetryableServerError
        );
    }

    #[tokio::test]
    async fn mock_transport_replays_script_then_default() {
        let transport = mock::MockTransport::new();
        transport
            .script_outcomes([
                TransportOutcome::RetryableNetworkError,
                TransportOutcome::RetryableServerError,
            ])
            .await;

        let payload = Bytes::from_static(b"{}");
        assert_eq!(
            transport.send(payload.clone(), 0).await,
            TransportOutcome::RetryableNetworkError
        );
        assert_eq!(
            transport.send(payload.clone(), 10).await,
            TransportOutcome::RetryableServerError
        );
        assert_eq!(transport.send(payload, 20).await, TransportOutcome::Success);

        let sends = transport.recorded_sends().await;
        assert_eq!(sends.len(), 3);
        assert_eq!(sends[2].age_millis, 20);
    }
}
