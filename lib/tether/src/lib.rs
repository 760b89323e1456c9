//! HTTP request pipeline with path-scoped middleware and pluggable retry
//! policies.
//!
//! Every call goes through the same loop: the [`Endpoint`] prepares a fresh
//! [`Request`], pre-request middleware run (global first, then the ones whose
//! [`PathPattern`] matches the path), the [`Transport`] executes it, the result
//! is classified into a [`NetworkError`], post-response middleware may ask for
//! a retry, and the [`RetryPolicy`] decides what happens next.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tether::prelude::*;
//!
//! #[derive(Debug, Deserialize)]
//! pub struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! let client = Client::builder()
//!     .retry_policy(RetryPolicy::exponential(3, Duration::from_millis(250), Duration::from_secs(10)))
//!     .build();
//!
//! client.add_middleware(Middleware::global().pre_request(BearerAuth::new("my-token")))?;
//! client.add_middleware(
//!     Middleware::new(PathPattern::glob("/admin/**")).on_request(|req, _ctx| {
//!         req.set_header("x-admin", "true")?;
//!         Ok(())
//!     }),
//! )?;
//!
//! let url = "https://api.example.com/users/42".parse()?;
//! let user: User = client
//!     .execute_json(Request::builder(Method::GET, url).build()?)
//!     .await?;
//! ```

mod client;
mod config;
mod dispatcher;
pub mod middleware;
pub mod prelude;
mod transport;

// Re-export client types
pub use client::{Client, ClientBuilder, RequestHandle};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use dispatcher::Dispatcher;
pub use transport::{BoxedService, HyperTransport, ServiceTransport};

// Re-export core types
pub use tether_core::{
    BoxError, Cause, ClassifiedOutcome, Endpoint, ErrorCondition, NetworkError, PathPattern,
    PatternError, Request, RequestBuilder, Response, Result, RetryConfig, RetryPolicy,
    RetryStrategy, StrategyKind, Transport, WithRetry, classify, parse_retry_after,
};

// Re-export http types for methods, status codes and headers
pub use tether_core::{HeaderMap, Method, StatusCode, header};

// Re-export tower for wrapping transports, and cancellation tokens
pub use tokio_util::sync::CancellationToken;
pub use tower;
pub use url;
