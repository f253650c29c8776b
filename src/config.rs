//! Engine configuration.
//!
//! All validation happens at construction time: a constructed
//! [`EngineConfig`] is always usable, so invalid endpoints or identifiers
//! can never surface as delivery-time failures. The config is passed
//! explicitly to the engine; there is no process-wide singleton.

use std::time::Duration;

use uuid::Uuid;

use crate::{
    error::{EngineError, Result},
    retry::RetryPolicy,
};

/// Default transport timeout in seconds.
pub const DEFAULT_TRANSPORT_TIMEOUT_SECS: u64 = 30;

/// Default maximum time to wait for the lane during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Configuration and identity context for the delivery engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Application identifier appended to the ingestion URL path.
    pub endpoint: String,

    /// Host the events are delivered to, without scheme.
    pub domain: String,

    /// Device identifier carried for tracking continuity, if known.
    pub device_uuid: Option<Uuid>,

    /// Installation identifier from a previous install, if known.
    pub installation_id: Option<Uuid>,

    /// Timeout for a single transport call. A timeout classifies as a
    /// retryable network error.
    pub transport_timeout: Duration,

    /// Maximum time to wait for the delivery lane during shutdown.
    pub shutdown_timeout: Duration,

    /// Retry pacing for failed attempts.
    pub retry_policy: RetryPolicy,
}

impl EngineConfig {
    /// Creates a configuration for the given endpoint and domain.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if `endpoint` is empty or
    /// `domain` is not a valid https host.
    pub fn new(endpoint: impl Into<String>, domain: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        let domain = domain.into();

        if endpoint.trim().is_empty() {
            return Err(EngineError::configuration("endpoint must not be empty"));
        }

        let url = reqwest::Url::parse(&format!("https://{domain}"))
            .map_err(|e| EngineError::configuration(format!("invalid domain {domain:?}: {e}")))?;
        if url.host_str().is_none() {
            return Err(EngineError::configuration(format!("domain {domain:?} has no host")));
        }

        Ok(Self {
            endpoint,
            domain,
            device_uuid: None,
            installation_id: None,
            transport_timeout: Duration::from_secs(DEFAULT_TRANSPORT_TIMEOUT_SECS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Sets the device UUID from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if the value is not a UUID.
    pub fn with_device_uuid(mut self, uuid: &str) -> Result<Self> {
        self.device_uuid = Some(parse_uuid("device_uuid", uuid)?);
        Ok(self)
    }

    /// Sets the previous installation id from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if the value is not a UUID.
    pub fn with_installation_id(mut self, uuid: &str) -> Result<Self> {
        self.installation_id = Some(parse_uuid("installation_id", uuid)?);
        Ok(self)
    }

    /// Overrides the transport timeout.
    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }

    /// Overrides the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Full URL events are posted to.
    pub fn ingest_url(&self) -> String {
        format!("https://{}/v1/{}/events", self.domain, self.endpoint)
    }
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| EngineError::configuration(format!("{field} is not a valid UUID: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config_accepted() {
        let config = EngineConfig::new("app-ios", "api.example.com").unwrap();
        assert_eq!(config.ingest_url(), "https://api.example.com/v1/app-ios/events");
    }

    #[test]
    fn empty_endpoint_rejected() {
        let err = EngineConfig::new("  ", "api.example.com").unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn unparsable_domain_rejected() {
        assert!(EngineConfig::new("app", "not a domain").is_err());
        assert!(EngineConfig::new("app", "").is_err());
    }

    #[test]
    fn identity_uuids_validated() {
        let config = EngineConfig::new("app", "api.example.com")
            .unwrap()
            .with_device_uuid("0593B5CC-1479-4E45-A7D3-F0E8F9B40898")
            .unwrap();
        assert!(config.device_uuid.is_some());

        let err = EngineConfig::new("app", "api.example.com")
            .unwrap()
            .with_installation_id("not-a-uuid")
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }
}
