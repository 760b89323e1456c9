//! Caller-facing client.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use serde::de::DeserializeOwned;
use tether_core::{Endpoint, PathPattern, Response, Result, RetryPolicy, Transport};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ClientConfigBuilder};
use crate::dispatcher::Dispatcher;
use crate::middleware::{Middleware, MiddlewareId, MiddlewareRegistry, RegistryError};
use crate::transport::HyperTransport;

// ============================================================================
// Client
// ============================================================================

/// HTTP client running every call through the middleware and retry pipeline.
///
/// Cloning is cheap: clones share the transport and the middleware registry,
/// so middleware registered through one clone applies to all of them.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tether::middleware::{BearerAuth, Middleware};
/// use tether::{Client, Method, Request, RetryPolicy};
///
/// let client = Client::builder()
///     .timeout(Duration::from_secs(10))
///     .retry_policy(RetryPolicy::exponential(3, Duration::from_millis(200), Duration::from_secs(5)))
///     .build();
/// client.add_middleware(Middleware::global().pre_request(BearerAuth::new("my-token")))?;
///
/// let request = Request::builder(Method::GET, "https://api.example.com/users/42".parse()?).build()?;
/// let user: User = client.execute_json(request).await?;
/// ```
pub struct Client<T = HyperTransport> {
    transport: Arc<T>,
    registry: Arc<MiddlewareRegistry>,
    config: ClientConfig,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("middleware", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a new client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self::with_transport(HyperTransport::new(config.clone()), config)
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Client<T>
where
    T: Transport + 'static,
{
    /// Create a client on top of a custom transport.
    ///
    /// Only the retry policy of `config` is used; timeouts and pooling are
    /// the transport's business.
    #[must_use]
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            registry: Arc::new(MiddlewareRegistry::new()),
            config,
        }
    }

    /// Get the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shared middleware registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<MiddlewareRegistry> {
        &self.registry
    }

    /// Register a middleware; it applies from the next attempt of any call.
    pub fn add_middleware(&self, middleware: Middleware) -> std::result::Result<MiddlewareId, RegistryError> {
        self.registry.add(middleware)
    }

    /// Unregister a middleware by id. Returns `true` if it was registered.
    pub fn remove_middleware(&self, id: &MiddlewareId) -> bool {
        self.registry.remove(id).is_some()
    }

    /// Unregister every middleware whose pattern text equals `pattern`.
    pub fn remove_middleware_matching(&self, pattern: &str) -> usize {
        self.registry.remove_matching(pattern)
    }

    /// Unregister every middleware scoped with an equal [`PathPattern`].
    pub fn remove_middleware_with(&self, pattern: &PathPattern) -> usize {
        self.registry.remove_matching(pattern.pattern())
    }

    fn dispatcher<E: Endpoint>(&self, endpoint: E, cancel: CancellationToken) -> Dispatcher<T, E> {
        let policy = endpoint
            .retry_policy()
            .unwrap_or_else(|| self.config.retry_policy.clone());
        Dispatcher::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.registry),
            endpoint,
            policy,
            cancel,
        )
    }

    /// Execute a call through the pipeline.
    ///
    /// # Errors
    ///
    /// The classified [`tether_core::NetworkError`] of the final attempt,
    /// [`tether_core::NetworkError::RetriesExhausted`] when the retry budget
    /// ran out, or a middleware failure.
    pub async fn execute<E: Endpoint>(&self, endpoint: E) -> Result<Response> {
        self.execute_with_cancel(endpoint, CancellationToken::new())
            .await
    }

    /// Execute a call that stops with
    /// [`tether_core::NetworkError::Cancelled`] once `cancel` fires.
    pub async fn execute_with_cancel<E: Endpoint>(
        &self,
        endpoint: E,
        cancel: CancellationToken,
    ) -> Result<Response> {
        self.dispatcher(endpoint, cancel).run().await
    }

    /// Execute a call and decode the JSON body of the successful response.
    ///
    /// Decoding happens after the pipeline is done, so a body that fails to
    /// decode is never retried.
    pub async fn execute_json<E, R>(&self, endpoint: E) -> Result<R>
    where
        E: Endpoint,
        R: DeserializeOwned,
    {
        self.execute(endpoint).await?.json()
    }

    /// Run a call on a tokio task and hand the outcome to `callback`.
    ///
    /// Once [`RequestHandle::cancel`] has been called the callback is not
    /// invoked, whatever the state of the call. A cancel racing with a
    /// callback that has already started does not interrupt it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<E, F>(&self, endpoint: E, callback: F) -> RequestHandle
    where
        E: Endpoint + 'static,
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let dispatcher = self.dispatcher(endpoint, cancel.clone());
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let result = dispatcher.run().await;
            tokio::select! {
                biased;
                () = token.cancelled() => debug!("call cancelled, callback suppressed"),
                () = std::future::ready(()) => callback(result),
            }
        });
        RequestHandle { cancel, task }
    }

    /// Run a call as a single-item stream.
    ///
    /// The stream yields the outcome of the pipeline once, then ends. A
    /// `cancel` that fires before or during the call yields
    /// [`tether_core::NetworkError::Cancelled`].
    pub fn stream<E>(&self, endpoint: E, cancel: CancellationToken) -> BoxStream<'static, Result<Response>>
    where
        E: Endpoint + 'static,
    {
        let dispatcher = self.dispatcher(endpoint, cancel);
        stream::once(dispatcher.run()).boxed()
    }
}

// ============================================================================
// Callback handle
// ============================================================================

/// Handle on a call started with [`Client::spawn`].
///
/// Dropping the handle detaches the call; it is not cancelled.
#[derive(Debug)]
pub struct RequestHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RequestHandle {
    /// Cancel the call: the in-flight attempt or pending retry timer is
    /// dropped and the callback is suppressed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once [`RequestHandle::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `true` once the call and its callback are done.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the call and its callback to complete.
    ///
    /// # Errors
    ///
    /// Fails if the callback panicked.
    pub async fn join(self) -> std::result::Result<(), JoinError> {
        self.task.await
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`Client`] over the default [`HyperTransport`].
///
/// ```ignore
/// use std::time::Duration;
/// use tether::{Client, RetryPolicy};
///
/// let client = Client::builder()
///     .timeout(Duration::from_secs(30))
///     .pool_idle_per_host(8)
///     .retry_policy(RetryPolicy::immediate(1))
///     .middleware(Middleware::global().hooks(Logging::new()))
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfigBuilder,
    middleware: Vec<Middleware>,
}

impl ClientBuilder {
    /// Set the per-attempt request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Set the default retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: impl Into<RetryPolicy>) -> Self {
        self.config = self.config.retry_policy(policy);
        self
    }

    /// Register a middleware at build time, after the ones already added.
    #[must_use]
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Fails if two middleware share an id.
    pub fn try_build(self) -> std::result::Result<Client, RegistryError> {
        let client = Client::with_config(self.config.build());
        for middleware in self.middleware {
            client.add_middleware(middleware)?;
        }
        Ok(client)
    }

    /// Build the client, skipping middleware whose id is already taken.
    #[must_use]
    pub fn build(self) -> Client {
        let client = Client::with_config(self.config.build());
        for middleware in self.middleware {
            if let Err(err) = client.add_middleware(middleware) {
                warn!(error = %err, "middleware skipped");
            }
        }
        client
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use tether_core::{BoxError, HeaderMap, Method, NetworkError, Request, StatusCode, WithRetry};

    use super::*;
    use crate::middleware::PostAction;

    struct Fixed(StatusCode, &'static str);

    impl Transport for Fixed {
        async fn execute(&self, _request: Request) -> std::result::Result<Response, BoxError> {
            Ok(Response::new(self.0, HeaderMap::new(), Bytes::from_static(self.1.as_bytes())))
        }
    }

    fn request() -> Request {
        let url = url::Url::parse("https://api.example.com/users/42").expect("url");
        Request::builder(Method::GET, url).build().expect("request")
    }

    #[tokio::test]
    async fn client_default() {
        let client = Client::new();
        assert_eq!(client.config().timeout, Duration::from_secs(30));
        assert_eq!(client.config().retry_policy, RetryPolicy::none());
    }

    #[tokio::test]
    async fn client_builder() {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .pool_idle_per_host(16)
            .retry_policy(RetryPolicy::immediate(2))
            .middleware(Middleware::global().with_id("a"))
            .middleware(Middleware::global().with_id("a"))
            .build();

        assert_eq!(client.config().timeout, Duration::from_secs(60));
        assert_eq!(client.config().pool_idle_per_host, 16);
        assert_eq!(client.registry().len(), 1);
        assert!(format!("{client:?}").contains("Client"));
    }

    #[tokio::test]
    async fn try_build_rejects_duplicates() {
        let result = Client::builder()
            .middleware(Middleware::global().with_id("a"))
            .middleware(Middleware::global().with_id("a"))
            .try_build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn clones_share_the_registry() {
        let client = Client::with_transport(Fixed(StatusCode::OK, ""), ClientConfig::default());
        let clone = client.clone();
        let id = clone.add_middleware(Middleware::global()).expect("add");
        assert_eq!(client.registry().len(), 1);
        assert!(client.remove_middleware(&id));
        assert!(!clone.remove_middleware(&id));
    }

    #[tokio::test]
    async fn remove_by_pattern() {
        let client = Client::with_transport(Fixed(StatusCode::OK, ""), ClientConfig::default());
        client
            .add_middleware(Middleware::new(PathPattern::glob("/api/**")))
            .expect("add");
        client
            .add_middleware(Middleware::new(PathPattern::glob("/api/**")))
            .expect("add");
        assert_eq!(client.remove_middleware_with(&PathPattern::glob("/api/**")), 2);
        assert_eq!(client.remove_middleware_matching("/api/**"), 0);
    }

    #[tokio::test]
    async fn endpoint_policy_overrides_default() {
        let config = ClientConfig::builder()
            .retry_policy(RetryPolicy::immediate(5))
            .build();
        let client = Client::with_transport(Fixed(StatusCode::SERVICE_UNAVAILABLE, ""), config);

        let error = client
            .execute(WithRetry::new(request(), RetryPolicy::immediate(1)))
            .await
            .expect_err("exhausted");
        let NetworkError::RetriesExhausted { attempts, .. } = error else {
            panic!("unexpected error: {error:?}");
        };
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn decode_failures_are_not_retried() {
        let config = ClientConfig::builder()
            .retry_policy(RetryPolicy::immediate(3))
            .build();
        let client = Client::with_transport(Fixed(StatusCode::OK, "not json"), config);
        let attempts = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&attempts);
        client
            .add_middleware(Middleware::global().on_response(move |_, _| {
                *counter.lock().expect("lock") += 1;
                PostAction::Continue
            }))
            .expect("add");

        let error = client
            .execute_json::<_, serde_json::Value>(request())
            .await
            .expect_err("invalid json");
        assert!(matches!(error, NetworkError::ParsingFailed(_)));
        assert_eq!(*attempts.lock().expect("lock"), 1);
    }

    #[tokio::test]
    async fn spawn_invokes_callback() {
        let client = Client::with_transport(Fixed(StatusCode::OK, "{}"), ClientConfig::default());
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = client.spawn(request(), move |result| {
            let _ = tx.send(result.map(|response| response.status()));
        });
        handle.join().await.expect("join");
        let status = rx.await.expect("callback").expect("response");
        assert_eq!(status, StatusCode::OK);
    }

    struct Slow;

    impl Transport for Slow {
        async fn execute(&self, _request: Request) -> std::result::Result<Response, BoxError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Response::new(StatusCode::OK, HeaderMap::new(), Bytes::new()))
        }
    }

    #[tokio::test]
    async fn stream_yields_single_outcome() {
        let client = Client::with_transport(Fixed(StatusCode::OK, "{}"), ClientConfig::default());
        let mut outcomes = client.stream(request(), CancellationToken::new());

        let response = outcomes.next().await.expect("one item").expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(outcomes.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_ends_with_cancelled() {
        let client = Client::with_transport(Fixed(StatusCode::OK, "{}"), ClientConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut outcomes = client.stream(request(), cancel);

        let error = outcomes.next().await.expect("one item").expect_err("cancelled");
        assert!(error.is_cancelled());
        assert!(outcomes.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_cancelled_in_flight() {
        let client = Client::with_transport(Slow, ClientConfig::default());
        let cancel = CancellationToken::new();
        let mut outcomes = client.stream(request(), cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });
        let error = outcomes.next().await.expect("one item").expect_err("cancelled");
        assert!(error.is_cancelled());
        canceller.await.expect("canceller");
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_cancelled_in_flight_suppresses_callback() {
        let client = Client::with_transport(Slow, ClientConfig::default());
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);

        let handle = client.spawn(request(), move |_| {
            *flag.lock().expect("lock") = true;
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
        handle.join().await.expect("join");

        assert!(!*called.lock().expect("lock"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_spawn_suppresses_callback() {
        let config = ClientConfig::builder()
            .retry_policy(RetryPolicy::linear(3, Duration::from_secs(30)))
            .build();
        let client = Client::with_transport(Fixed(StatusCode::BAD_GATEWAY, ""), config);
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);

        let handle = client.spawn(request(), move |_| {
            *flag.lock().expect("lock") = true;
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
        assert!(handle.is_cancelled());
        handle.join().await.expect("join");

        assert!(!*called.lock().expect("lock"));
    }
}
