//! Boundary classification of transport results.
//!
//! [`classify`] turns whatever the transport produced into a
//! [`ClassifiedOutcome`]. Nothing downstream looks at raw errors.

use std::io;
use std::time::{Duration, SystemTime};

use http::StatusCode;

use crate::error::{BoxError, Cause};
use crate::{NetworkError, Response};

/// Result of one attempt after classification.
#[derive(Debug, Clone)]
pub enum ClassifiedOutcome {
    /// 2xx response.
    Success(Response),
    /// Failure that matches at least one retry condition.
    RetryableError(NetworkError),
    /// Failure that no policy may retry.
    TerminalError(NetworkError),
}

impl ClassifiedOutcome {
    /// Wrap an error, picking the retryable or terminal side by its conditions.
    #[must_use]
    pub fn from_error(error: NetworkError) -> Self {
        let retryable = crate::ErrorCondition::ALL
            .iter()
            .any(|condition| error.matches_condition(*condition));
        if retryable {
            Self::RetryableError(error)
        } else {
            Self::TerminalError(error)
        }
    }

    /// The classified error, if the attempt failed.
    #[must_use]
    pub const fn error(&self) -> Option<&NetworkError> {
        match self {
            Self::Success(_) => None,
            Self::RetryableError(error) | Self::TerminalError(error) => Some(error),
        }
    }

    /// The response, if the attempt succeeded.
    #[must_use]
    pub const fn response(&self) -> Option<&Response> {
        match self {
            Self::Success(response) => Some(response),
            _ => None,
        }
    }

    /// Returns `true` for a 2xx response.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert into a plain result.
    pub fn into_result(self) -> crate::Result<Response> {
        match self {
            Self::Success(response) => Ok(response),
            Self::RetryableError(error) | Self::TerminalError(error) => Err(error),
        }
    }
}

/// Classify the raw result of a transport call.
#[must_use]
pub fn classify(result: Result<Response, BoxError>) -> ClassifiedOutcome {
    match result {
        Ok(response) => classify_response(response, SystemTime::now()),
        Err(error) => ClassifiedOutcome::from_error(classify_transport_error(error)),
    }
}

/// Classify a response that made it back from the server.
#[must_use]
pub fn classify_response(response: Response, now: SystemTime) -> ClassifiedOutcome {
    let status = response.status();
    if status.is_success() {
        return ClassifiedOutcome::Success(response);
    }

    let error = if status == StatusCode::TOO_MANY_REQUESTS {
        let delay = response
            .header(http::header::RETRY_AFTER.as_str())
            .and_then(|value| parse_retry_after(value, now));
        NetworkError::RateLimited(delay)
    } else {
        let body = response.into_body();
        NetworkError::HttpError {
            status: status.as_u16(),
            body: (!body.is_empty()).then_some(body),
        }
    };
    ClassifiedOutcome::from_error(error)
}

/// Parse a `Retry-After` header value.
///
/// Integer seconds are tried first, then an RFC 7231 HTTP-date relative to
/// `now`. A date in the past yields a zero delay; anything else is ignored.
#[must_use]
pub fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(value).ok()?;
    Some(date.duration_since(now).unwrap_or(Duration::ZERO))
}

/// Map a raw transport failure onto the taxonomy.
///
/// Walks the `source()` chain looking for an already classified error or an
/// `io::Error`, then falls back to message inspection.
#[must_use]
pub fn classify_transport_error(error: BoxError) -> NetworkError {
    let error = match error.downcast::<NetworkError>() {
        Ok(classified) => return *classified,
        Err(error) => error,
    };

    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(&*error);
    while let Some(err) = current {
        if let Some(classified) = err.downcast_ref::<NetworkError>() {
            return classified.clone();
        }
        if let Some(io) = err.downcast_ref::<io::Error>() {
            if let Some(classified) = classify_io_kind(io.kind()) {
                return classified;
            }
        }
        current = err.source();
    }

    classify_message(error)
}

fn classify_io_kind(kind: io::ErrorKind) -> Option<NetworkError> {
    match kind {
        io::ErrorKind::TimedOut => Some(NetworkError::Timeout),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => Some(NetworkError::ConnectionLost),
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkDown => Some(NetworkError::NetworkFailure),
        _ => None,
    }
}

fn classify_message(error: BoxError) -> NetworkError {
    let message = full_message(&*error).to_lowercase();

    if message.contains("timed out") || message.contains("deadline has elapsed") {
        return NetworkError::Timeout;
    }
    if message.contains("dns") || message.contains("failed to lookup address") {
        return NetworkError::DnsLookupFailed;
    }
    if message.contains("ssl") || message.contains("tls") || message.contains("certificate") {
        return NetworkError::SslError(Cause::new(error));
    }
    if message.contains("connection closed") || message.contains("connection reset") {
        return NetworkError::ConnectionLost;
    }
    if message.contains("connect") {
        return NetworkError::NetworkFailure;
    }
    NetworkError::Generic(Cause::new(error))
}

fn full_message(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(err) = current {
        message.push_str(": ");
        message.push_str(&err.to_string());
        current = err.source();
    }
    message
}
