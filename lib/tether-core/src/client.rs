//! Collaborator traits.
//!
//! - [`Transport`] - executes a prepared request on the wire
//! - [`Endpoint`] - produces the prepared request for each attempt
//!
//! The pipeline neither builds URLs nor encodes bodies; it only asks an
//! [`Endpoint`] for a fresh [`Request`] per attempt and hands it to a
//! [`Transport`].

use std::future::Future;
use std::sync::Arc;

use crate::error::BoxError;
use crate::{Request, Response, RetryPolicy};

/// Executes one prepared request.
///
/// Failures are returned raw; the pipeline classifies them exactly once.
/// Dropping the returned future must cancel the call.
pub trait Transport: Send + Sync {
    /// Execute an HTTP request and return the response.
    ///
    /// # Errors
    ///
    /// Returns the underlying failure (I/O, TLS, DNS, timeout, ...) unclassified.
    fn execute(
        &self,
        request: Request,
    ) -> impl Future<Output = std::result::Result<Response, BoxError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn execute(
        &self,
        request: Request,
    ) -> impl Future<Output = std::result::Result<Response, BoxError>> + Send {
        (**self).execute(request)
    }
}

/// Supplies the prepared request for every attempt of a logical call.
///
/// `prepare` is called again before each retry, so headers computed from
/// external state are recomputed rather than reused.
pub trait Endpoint: Send + Sync {
    /// Produce the request for the next attempt.
    ///
    /// # Errors
    ///
    /// Typically [`crate::NetworkError::UrlGenerationFailed`].
    fn prepare(&self) -> crate::Result<Request>;

    /// Retry policy for this call; the client default applies when `None`.
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }
}

impl Endpoint for Request {
    fn prepare(&self) -> crate::Result<Request> {
        Ok(self.clone())
    }
}

impl<E: Endpoint + ?Sized> Endpoint for &E {
    fn prepare(&self) -> crate::Result<Request> {
        (**self).prepare()
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        (**self).retry_policy()
    }
}

/// An [`Endpoint`] with an explicit retry policy.
#[derive(Debug, Clone)]
pub struct WithRetry<E> {
    endpoint: E,
    policy: RetryPolicy,
}

impl<E> WithRetry<E> {
    /// Attach `policy` to `endpoint`.
    pub const fn new(endpoint: E, policy: RetryPolicy) -> Self {
        Self { endpoint, policy }
    }
}

impl<E: Endpoint> Endpoint for WithRetry<E> {
    fn prepare(&self) -> crate::Result<Request> {
        self.endpoint.prepare()
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(self.policy.clone())
    }
}
