//! Wire transports.
//!
//! - [`HyperTransport`] - hyper-util client with rustls, the default
//! - [`ServiceTransport`] - any `tower::Service` used as a [`Transport`]
//!
//! Transports return failures raw. Timeouts surface as
//! [`std::io::ErrorKind::TimedOut`] so that classification happens once, in
//! the dispatcher.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tether_core::{BoxError, Request, Response, Transport};
use tower::ServiceExt;
use tower::util::BoxCloneService;
use tower_service::Service;

use crate::config::ClientConfig;

/// Create an HTTPS connector with rustls.
///
/// This connector supports both HTTP/1.1 and HTTP/2, with TLS enabled
/// using the Mozilla root certificates.
fn https_connector(config: &ClientConfig) -> HttpsConnector<HttpConnector> {
    let root_store: rustls::RootCertStore =
        webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(config.connect_timeout));

    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http)
}

// ============================================================================
// Hyper
// ============================================================================

/// HTTP transport using hyper-util with connection pooling and TLS.
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<HttpConnector>, Full<bytes::Bytes>>,
    config: ClientConfig,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl HyperTransport {
    /// Create a transport with the pool and timeout settings of `config`.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build(https_connector(&config));

        Self { inner, config }
    }

    /// Get the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_hyper_request(request: Request) -> Result<http::Request<Full<bytes::Bytes>>, BoxError> {
        let (method, url, headers, body) = request.into_parts();

        let mut http_request = http::Request::builder()
            .method(method)
            .uri(url.as_str())
            .body(body.map_or_else(Full::default, Full::new))?;
        *http_request.headers_mut() = headers;

        Ok(http_request)
    }

    async fn send(&self, request: Request) -> Result<Response, BoxError> {
        let hyper_request = Self::build_hyper_request(request)?;

        let response = tokio::time::timeout(self.config.timeout, self.inner.request(hyper_request))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request timed out"))??;

        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok(Response::new(parts.status, parts.headers, body))
    }
}

impl Transport for HyperTransport {
    async fn execute(&self, request: Request) -> Result<Response, BoxError> {
        self.send(request).await
    }
}

// ============================================================================
// Tower
// ============================================================================

/// Type-erased tower service accepted by [`ServiceTransport`].
pub type BoxedService = BoxCloneService<Request, Response, BoxError>;

/// Adapts a `tower::Service` into a [`Transport`].
///
/// The service is cloned out of a mutex for each call, so layers that are
/// `Clone` but not `Sync` (rate limiters, concurrency limits) can wrap the
/// wire call.
///
/// ```ignore
/// use std::time::Duration;
/// use tether::{HyperTransport, ServiceTransport};
/// use tower::ServiceBuilder;
///
/// let transport = ServiceTransport::new(
///     ServiceBuilder::new()
///         .concurrency_limit(8)
///         .service(HyperTransport::default().into_service()),
/// );
/// ```
#[derive(Clone)]
pub struct ServiceTransport {
    inner: Arc<Mutex<BoxedService>>,
}

impl std::fmt::Debug for ServiceTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTransport").finish_non_exhaustive()
    }
}

impl ServiceTransport {
    /// Wrap a service.
    pub fn new<S>(service: S) -> Self
    where
        S: Service<Request, Response = Response, Error = BoxError> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(BoxCloneService::new(service))),
        }
    }
}

impl Transport for ServiceTransport {
    async fn execute(&self, request: Request) -> Result<Response, BoxError> {
        // Lock, clone the service, and release the lock immediately
        let service = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        service.oneshot(request).await
    }
}

impl HyperTransport {
    /// Expose this transport as a `tower::Service`, to be wrapped in layers
    /// and handed to [`ServiceTransport::new`].
    #[must_use]
    pub fn into_service(self) -> BoxedService {
        let transport = Arc::new(self);
        BoxCloneService::new(tower::service_fn(move |request: Request| {
            let transport = Arc::clone(&transport);
            async move { transport.send(request).await }
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tether_core::{HeaderMap, Method, StatusCode};

    use super::*;

    fn request(url: &str) -> Request {
        Request::builder(Method::POST, url::Url::parse(url).expect("url"))
            .header("x-trace", "abc")
            .body("payload")
            .build()
            .expect("request")
    }

    #[test]
    fn builds_hyper_request() {
        let http_request =
            HyperTransport::build_hyper_request(request("https://api.example.com/users?page=2"))
                .expect("request");
        assert_eq!(http_request.method(), http::Method::POST);
        assert_eq!(http_request.uri(), "https://api.example.com/users?page=2");
        assert_eq!(
            http_request
                .headers()
                .get("x-trace")
                .and_then(|v| v.to_str().ok()),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn transport_config() {
        let config = ClientConfig::builder()
            .timeout(Duration::from_secs(5))
            .build();
        let transport = HyperTransport::new(config);
        assert_eq!(transport.config().timeout, Duration::from_secs(5));
        assert!(format!("{transport:?}").contains("HyperTransport"));
    }

    #[tokio::test]
    async fn service_transport_calls_service() {
        let service = tower::service_fn(|request: Request| async move {
            let status = if request.path() == "/ok" {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            };
            Ok::<_, BoxError>(Response::new(status, HeaderMap::new(), Bytes::new()))
        });
        let transport = ServiceTransport::new(service);

        let ok = transport
            .execute(request("http://localhost/ok"))
            .await
            .expect("response");
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = transport
            .execute(request("http://localhost/missing"))
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
