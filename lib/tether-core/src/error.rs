//! Error taxonomy for tether.
//!
//! Every raw failure is classified exactly once into [`NetworkError`]; retry
//! policies and middleware only ever see the classified value.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use derive_more::{Display, Error};

/// Boxed error type used at the transport and hook boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ============================================================================
// Shared Cause
// ============================================================================

/// A cloneable, shared underlying error.
///
/// Keeps the original `source()` chain while letting [`NetworkError`] stay `Clone`.
#[derive(Clone)]
pub struct Cause(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl Cause {
    /// Wrap any error.
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self(Arc::from(error.into()))
    }

    /// Build a cause from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(message.into())
    }

    /// Borrow the wrapped error.
    #[must_use]
    pub fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Cause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Failure families a retry policy can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCondition {
    /// The request timed out.
    Timeout,
    /// An established connection dropped.
    ConnectionLost,
    /// Generic network unreachability.
    NetworkFailure,
    /// Host name resolution failed.
    DnsLookupFailed,
    /// The server answered with a 5xx status.
    ServerError,
    /// The server answered with 429.
    RateLimited,
}

impl ErrorCondition {
    /// Every condition, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Timeout,
        Self::ConnectionLost,
        Self::NetworkFailure,
        Self::DnsLookupFailed,
        Self::ServerError,
        Self::RateLimited,
    ];
}

// ============================================================================
// Error Type
// ============================================================================

/// Classified failure of a request pipeline.
#[derive(Debug, Clone, Display, Error)]
pub enum NetworkError {
    /// The request timed out.
    #[display("request timeout")]
    Timeout,

    /// The connection was lost while the request was in flight.
    #[display("connection lost")]
    ConnectionLost,

    /// The network could not be reached.
    #[display("network failure")]
    NetworkFailure,

    /// DNS resolution failed.
    #[display("DNS lookup failed")]
    DnsLookupFailed,

    /// TLS handshake or certificate failure.
    #[display("TLS error: {_0}")]
    SslError(Cause),

    /// The request was cancelled by the caller.
    #[display("request cancelled")]
    Cancelled,

    /// The server answered 429, optionally with a `Retry-After` delay.
    #[display("rate limited")]
    RateLimited(#[error(not(source))] Option<Duration>),

    /// Non-2xx HTTP status.
    #[display("HTTP error {status}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// The response body could not be decoded.
    #[display("parsing failed: {_0}")]
    ParsingFailed(#[error(not(source))] String),

    /// A body was expected but none was returned.
    #[display("empty response")]
    EmptyResponse,

    /// A pre-request hook failed.
    #[display("middleware error: {_0}")]
    MiddlewareError(Cause),

    /// A middleware asked for a retry but no attempts remain.
    #[display("middleware requested a retry but the retry budget is exhausted")]
    MiddlewareRetryBudgetExceeded,

    /// The request URL could not be produced.
    #[display("URL generation failed: {_0}")]
    UrlGenerationFailed(#[error(not(source))] String),

    /// A retryable failure persisted after every attempt was used.
    #[display("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts performed.
        #[error(not(source))]
        attempts: u32,
        /// Error of the final attempt.
        #[error(source)]
        last: Box<NetworkError>,
    },

    /// Anything that fits no other kind.
    #[display("{_0}")]
    Generic(Cause),
}

/// Result type alias using [`NetworkError`].
pub type Result<T> = std::result::Result<T, NetworkError>;

impl NetworkError {
    /// Create an HTTP error without body.
    #[must_use]
    pub const fn http(status: u16) -> Self {
        Self::HttpError { status, body: None }
    }

    /// Create an HTTP error with body.
    #[must_use]
    pub const fn http_with_body(status: u16, body: Bytes) -> Self {
        Self::HttpError {
            status,
            body: Some(body),
        }
    }

    /// Wrap a pre-request hook failure.
    pub fn middleware(error: impl Into<BoxError>) -> Self {
        Self::MiddlewareError(Cause::new(error))
    }

    /// Create a TLS error.
    pub fn ssl(error: impl Into<BoxError>) -> Self {
        Self::SslError(Cause::new(error))
    }

    /// Create a generic error.
    pub fn generic(error: impl Into<BoxError>) -> Self {
        Self::Generic(Cause::new(error))
    }

    /// Returns `true` if this error belongs to the given condition family.
    ///
    /// Cancellation, decoding failures, URL failures and budget exhaustion
    /// match nothing and are therefore never retried.
    #[must_use]
    pub const fn matches_condition(&self, condition: ErrorCondition) -> bool {
        match self {
            Self::Timeout => matches!(condition, ErrorCondition::Timeout),
            Self::ConnectionLost => matches!(condition, ErrorCondition::ConnectionLost),
            Self::NetworkFailure => matches!(condition, ErrorCondition::NetworkFailure),
            Self::DnsLookupFailed => matches!(condition, ErrorCondition::DnsLookupFailed),
            Self::RateLimited(_) => matches!(condition, ErrorCondition::RateLimited),
            Self::HttpError { status, .. } => {
                matches!(condition, ErrorCondition::ServerError) && *status >= 500 && *status < 600
            }
            Self::SslError(_)
            | Self::Cancelled
            | Self::ParsingFailed(_)
            | Self::EmptyResponse
            | Self::MiddlewareError(_)
            | Self::MiddlewareRetryBudgetExceeded
            | Self::UrlGenerationFailed(_)
            | Self::RetriesExhausted { .. }
            | Self::Generic(_) => false,
        }
    }

    /// Server-provided retry delay, for rate-limited responses.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(delay) => *delay,
            _ => None,
        }
    }

    /// Returns the HTTP status code, if the failure carries one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::HttpError { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }

    /// Returns the response body if this is an HTTP error with a body.
    #[must_use]
    pub const fn body(&self) -> Option<&Bytes> {
        match self {
            Self::HttpError { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if the caller cancelled the request.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns `true` if the retry budget ran out.
    #[must_use]
    pub const fn is_budget_exhausted(&self) -> bool {
        matches!(
            self,
            Self::RetriesExhausted { .. } | Self::MiddlewareRetryBudgetExceeded
        )
    }

    /// Short stable name of the kind, used for logs and metric labels.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionLost => "connection_lost",
            Self::NetworkFailure => "network_failure",
            Self::DnsLookupFailed => "dns_lookup_failed",
            Self::SslError(_) => "ssl_error",
            Self::Cancelled => "cancelled",
            Self::RateLimited(_) => "rate_limited",
            Self::HttpError { .. } => "http_error",
            Self::ParsingFailed(_) => "parsing_failed",
            Self::EmptyResponse => "empty_response",
            Self::MiddlewareError(_) => "middleware_error",
            Self::MiddlewareRetryBudgetExceeded => "middleware_retry_budget_exceeded",
            Self::UrlGenerationFailed(_) => "url_generation_failed",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Generic(_) => "generic",
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        Self::UrlGenerationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(NetworkError::http(404).to_string(), "HTTP error 404");
        assert_eq!(NetworkError::Timeout.to_string(), "request timeout");
        assert_eq!(
            NetworkError::middleware("token expired").to_string(),
            "middleware error: token expired"
        );
        assert_eq!(
            NetworkError::RetriesExhausted {
                attempts: 3,
                last: Box::new(NetworkError::http(503)),
            }
            .to_string(),
            "retries exhausted after 3 attempts: HTTP error 503"
        );
    }

    #[test]
    fn server_error_condition_covers_5xx_only() {
        assert!(NetworkError::http(500).matches_condition(ErrorCondition::ServerError));
        assert!(NetworkError::http(599).matches_condition(ErrorCondition::ServerError));
        assert!(!NetworkError::http(600).matches_condition(ErrorCondition::ServerError));
        assert!(!NetworkError::http(404).matches_condition(ErrorCondition::ServerError));
        assert!(!NetworkError::http(503).matches_condition(ErrorCondition::Timeout));
    }

    #[test]
    fn transport_kinds_match_their_own_condition_only() {
        let pairs = [
            (NetworkError::Timeout, ErrorCondition::Timeout),
            (NetworkError::ConnectionLost, ErrorCondition::ConnectionLost),
            (NetworkError::NetworkFailure, ErrorCondition::NetworkFailure),
            (NetworkError::DnsLookupFailed, ErrorCondition::DnsLookupFailed),
            (NetworkError::RateLimited(None), ErrorCondition::RateLimited),
        ];
        for (error, own) in pairs {
            for condition in ErrorCondition::ALL {
                assert_eq!(
                    error.matches_condition(condition),
                    condition == own,
                    "{error:?} vs {condition:?}"
                );
            }
        }
    }

    #[test]
    fn terminal_kinds_match_nothing() {
        let terminal = [
            NetworkError::Cancelled,
            NetworkError::ParsingFailed("bad json".to_string()),
            NetworkError::EmptyResponse,
            NetworkError::UrlGenerationFailed("no host".to_string()),
            NetworkError::MiddlewareRetryBudgetExceeded,
            NetworkError::middleware("boom"),
        ];
        for error in terminal {
            for condition in ErrorCondition::ALL {
                assert!(!error.matches_condition(condition), "{error:?}");
            }
        }
    }

    #[test]
    fn error_accessors() {
        let body = Bytes::from_static(b"oops");
        let err = NetworkError::http_with_body(502, body.clone());
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.body(), Some(&body));
        assert!(err.is_server_error());

        let err = NetworkError::RateLimited(Some(Duration::from_secs(60)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
        assert_eq!(err.status(), Some(429));

        assert!(NetworkError::Cancelled.is_cancelled());
        assert!(NetworkError::MiddlewareRetryBudgetExceeded.is_budget_exhausted());
        assert_eq!(NetworkError::Timeout.status(), None);
    }

    #[test]
    fn middleware_error_keeps_source() {
        let io = std::io::Error::other("disk on fire");
        let err = NetworkError::middleware(io);
        let NetworkError::MiddlewareError(cause) = &err else {
            panic!("expected middleware error");
        };
        assert_eq!(cause.to_string(), "disk on fire");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn url_parse_error_becomes_url_generation_failed() {
        let err = NetworkError::from(url::ParseError::EmptyHost);
        assert!(matches!(err, NetworkError::UrlGenerationFailed(_)));
    }
}
