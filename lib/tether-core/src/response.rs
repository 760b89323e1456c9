//! HTTP response handling.
//!
//! [`Response`] is the `(status, headers, body)` tuple a [`crate::Transport`]
//! returns. Decoding helpers map failures onto [`NetworkError`].

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::NetworkError;

/// HTTP response with status, headers, and buffered body.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Creates a new response.
    #[must_use]
    pub const fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Single header value by name, if it is valid text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Consume into (status, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }

    /// Status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserialize the response body as JSON.
    ///
    /// An empty body is reported as [`NetworkError::EmptyResponse`], a body
    /// that does not decode as [`NetworkError::ParsingFailed`].
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        if self.body.is_empty() {
            return Err(NetworkError::EmptyResponse);
        }
        serde_json::from_slice(&self.body).map_err(|e| NetworkError::ParsingFailed(e.to_string()))
    }

    /// Get the response body as text.
    pub fn text(&self) -> crate::Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetworkError::ParsingFailed(e.to_string()))
    }
}
