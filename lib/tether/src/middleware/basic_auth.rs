//! Basic authentication hook.
//!
//! Sets an `Authorization: Basic <base64(user:pass)>` header on every request
//! it is scoped to.

use std::sync::Arc;

use base64::Engine;
use tether_core::header::{AUTHORIZATION, HeaderValue};
use tether_core::{BoxError, Request};

use super::{AttemptContext, PreRequest};

/// Pre-request hook that adds basic authentication.
///
/// # Example
///
/// ```ignore
/// use tether::middleware::{BasicAuth, Middleware};
/// use tether::PathPattern;
///
/// let admin = Middleware::new(PathPattern::glob("/admin/**"))
///     .pre_request(BasicAuth::new("username", "password"));
/// client.add_middleware(admin)?;
/// ```
#[derive(Debug, Clone)]
pub struct BasicAuth {
    /// Base64-encoded "username:password".
    encoded_credentials: Arc<str>,
}

impl BasicAuth {
    /// Create a new basic auth hook with the given username and password.
    pub fn new(username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        let credentials = format!("{}:{}", username.as_ref(), password.as_ref());
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        Self {
            encoded_credentials: Arc::from(encoded),
        }
    }
}

impl PreRequest for BasicAuth {
    fn pre_request(&self, request: &mut Request, _ctx: &AttemptContext) -> Result<(), BoxError> {
        let mut value = HeaderValue::try_from(format!("Basic {}", self.encoded_credentials))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tether_core::Method;

    use super::*;

    #[test]
    fn basic_auth_encodes_correctly() {
        // "user:pass" -> "dXNlcjpwYXNz"
        let hook = BasicAuth::new("user", "pass");
        assert_eq!(&*hook.encoded_credentials, "dXNlcjpwYXNz");
    }

    #[test]
    fn sets_authorization_header() {
        let url = url::Url::parse("https://api.example.com/admin").expect("url");
        let mut request = Request::builder(Method::GET, url).build().expect("request");
        BasicAuth::new("user", "pass")
            .pre_request(&mut request, &AttemptContext::new(0, 0, "/admin"))
            .expect("hook");
        assert_eq!(request.header("authorization"), Some("Basic dXNlcjpwYXNz"));
    }
}
