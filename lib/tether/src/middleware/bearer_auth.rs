//! Bearer token authentication hook.
//!
//! Sets an `Authorization: Bearer <token>` header on every request it is
//! scoped to.

use std::sync::Arc;

use tether_core::header::{AUTHORIZATION, HeaderValue};
use tether_core::{BoxError, Request};

use super::{AttemptContext, PreRequest};

/// Pre-request hook that adds bearer token authentication.
///
/// # Example
///
/// ```ignore
/// use tether::middleware::{BearerAuth, Middleware};
///
/// client.add_middleware(Middleware::global().pre_request(BearerAuth::new("my-secret-token")))?;
/// ```
#[derive(Debug, Clone)]
pub struct BearerAuth {
    token: Arc<str>,
}

impl BearerAuth {
    /// Create a new bearer auth hook with the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::from(token.into()),
        }
    }
}

impl PreRequest for BearerAuth {
    fn pre_request(&self, request: &mut Request, _ctx: &AttemptContext) -> Result<(), BoxError> {
        let mut value = HeaderValue::try_from(format!("Bearer {}", self.token))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}
