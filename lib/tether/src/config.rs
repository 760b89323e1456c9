//! Client configuration.
//!
//! The transport settings only apply to the default [`HyperTransport`]; a
//! client built over a custom transport only reads the retry policy.
//!
//! [`HyperTransport`]: crate::HyperTransport

use std::time::Duration;

use tether_core::RetryPolicy;

/// Settings shared by every call of a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Budget for one attempt; an attempt running longer fails with
    /// [`NetworkError::Timeout`](tether_core::NetworkError::Timeout) and may
    /// be retried.
    pub timeout: Duration,
    /// Budget for establishing a connection.
    pub connect_timeout: Duration,
    /// Idle connections kept per host.
    pub pool_idle_per_host: usize,
    /// How long an idle connection is kept.
    pub pool_idle_timeout: Duration,
    /// Used by every endpoint whose `retry_policy()` is `None`.
    pub retry_policy: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            retry_policy: RetryPolicy::none(),
        }
    }
}

impl ClientConfig {
    /// Start from the defaults.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`]; unset values keep their default.
///
/// ```ignore
/// let config = ClientConfig::builder()
///     .timeout(Duration::from_secs(5))
///     .retry_policy(RetryPolicy::linear(2, Duration::from_millis(100)))
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the idle connections kept per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config.pool_idle_per_host = count;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the default retry policy, from a [`RetryPolicy`] or a
    /// deserialized [`RetryConfig`](tether_core::RetryConfig).
    #[must_use]
    pub fn retry_policy(mut self, policy: impl Into<RetryPolicy>) -> Self {
        self.config.retry_policy = policy.into();
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
