//! Path-scoped middleware.
//!
//! A [`Middleware`] pairs a [`PathPattern`] with up to two hooks:
//!
//! - [`PreRequest`] runs before the transport call and may mutate the
//!   outgoing [`Request`] or abort the whole call with an error.
//! - [`PostResponse`] runs after classification and may ask for a retry
//!   with [`PostAction::RequestRetry`].
//!
//! Entries live in a [`MiddlewareRegistry`]. For each attempt the registry is
//! snapshotted and grouped into a [`MiddlewareChain`]: global entries (pattern
//! `"/"`) run first, then entries whose pattern matches the request path, each
//! group in registration order.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `middleware-basic-auth` | [`BasicAuth`] pre-request hook |
//! | `middleware-metrics` | [`Metrics`] hooks |
//! | `middleware-full` | All of the above |
//!
//! # Example
//!
//! ```ignore
//! use tether::middleware::{BearerAuth, Middleware, PostAction};
//! use tether::PathPattern;
//!
//! let auth = Middleware::global().pre_request(BearerAuth::new("my-token"));
//!
//! let refresh = Middleware::new(PathPattern::glob("/api/**"))
//!     .on_response(|outcome, _ctx| {
//!         if outcome.error().and_then(NetworkError::status) == Some(401) {
//!             PostAction::RequestRetry
//!         } else {
//!             PostAction::Continue
//!         }
//!     });
//!
//! client.add_middleware(auth)?;
//! client.add_middleware(refresh)?;
//! ```

#[cfg(feature = "middleware-basic-auth")]
mod basic_auth;
mod bearer_auth;
mod chain;
mod logging;
#[cfg(feature = "middleware-metrics")]
mod metrics;
mod registry;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tether_core::{BoxError, ClassifiedOutcome, PathPattern, Request};

#[cfg(feature = "middleware-basic-auth")]
pub use basic_auth::BasicAuth;
pub use bearer_auth::BearerAuth;
pub use chain::MiddlewareChain;
pub use logging::{LogLevel, Logging};
#[cfg(feature = "middleware-metrics")]
pub use metrics::Metrics;
pub use registry::{MiddlewareRegistry, RegistryError};

// ============================================================================
// Hook Contracts
// ============================================================================

/// Decision returned by a [`PostResponse`] hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostAction {
    /// Let the pipeline evaluate the outcome normally.
    #[default]
    Continue,
    /// Schedule another attempt, budget permitting.
    RequestRetry,
}

/// What hooks know about the attempt they run in.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    attempt: u32,
    max_retries: u32,
    path: Arc<str>,
}

impl AttemptContext {
    /// Creates a context for `attempt` of a call on `path`.
    #[must_use]
    pub fn new(attempt: u32, max_retries: u32, path: impl Into<Arc<str>>) -> Self {
        Self {
            attempt,
            max_retries,
            path: path.into(),
        }
    }

    /// Attempt number, starting at 0.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Retry budget of the call.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Retries still available after this attempt.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.attempt)
    }

    /// Path the middleware were grouped for.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Hook run before the transport call.
///
/// Returning an error aborts the call: no further hook runs, the transport is
/// not called and the error surfaces as [`tether_core::NetworkError::MiddlewareError`].
pub trait PreRequest: Send + Sync + 'static {
    /// Inspect or mutate the outgoing request.
    fn pre_request(&self, request: &mut Request, ctx: &AttemptContext) -> Result<(), BoxError>;
}

/// [`PreRequest`] hook backed by a closure, see [`pre_request_fn`].
#[derive(Clone, Copy)]
pub struct PreRequestFn<F>(F);

/// Turn a closure into a [`PreRequest`] hook.
pub const fn pre_request_fn<F>(f: F) -> PreRequestFn<F>
where
    F: Fn(&mut Request, &AttemptContext) -> Result<(), BoxError> + Send + Sync + 'static,
{
    PreRequestFn(f)
}

impl<F> PreRequest for PreRequestFn<F>
where
    F: Fn(&mut Request, &AttemptContext) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn pre_request(&self, request: &mut Request, ctx: &AttemptContext) -> Result<(), BoxError> {
        (self.0)(request, ctx)
    }
}

/// Hook run after the attempt has been classified.
///
/// Hooks may suspend (e.g. to refresh a token); they are always awaited one
/// after the other, never concurrently.
pub trait PostResponse: Send + Sync + 'static {
    /// Observe the outcome and decide whether to ask for a retry.
    fn post_response<'a>(
        &'a self,
        outcome: &'a ClassifiedOutcome,
        ctx: &'a AttemptContext,
    ) -> BoxFuture<'a, PostAction>;
}

/// [`PostResponse`] hook backed by a synchronous closure, see [`post_response_fn`].
#[derive(Clone, Copy)]
pub struct PostResponseFn<F>(F);

/// Turn a synchronous closure into a [`PostResponse`] hook.
pub const fn post_response_fn<F>(f: F) -> PostResponseFn<F>
where
    F: Fn(&ClassifiedOutcome, &AttemptContext) -> PostAction + Send + Sync + 'static,
{
    PostResponseFn(f)
}

impl<F> PostResponse for PostResponseFn<F>
where
    F: Fn(&ClassifiedOutcome, &AttemptContext) -> PostAction + Send + Sync + 'static,
{
    fn post_response<'a>(
        &'a self,
        outcome: &'a ClassifiedOutcome,
        ctx: &'a AttemptContext,
    ) -> BoxFuture<'a, PostAction> {
        let action = (self.0)(outcome, ctx);
        Box::pin(std::future::ready(action))
    }
}

// ============================================================================
// Middleware Entry
// ============================================================================

/// Unique identifier of a registered [`Middleware`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MiddlewareId(Arc<str>);

impl MiddlewareId {
    /// Fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(uuid::Uuid::new_v4().to_string()))
    }

    /// Identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MiddlewareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MiddlewareId {
    fn from(id: &str) -> Self {
        Self(Arc::from(id))
    }
}

impl From<String> for MiddlewareId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// A pattern-scoped pair of hooks.
#[derive(Clone)]
pub struct Middleware {
    id: MiddlewareId,
    pattern: PathPattern,
    pre_request: Option<Arc<dyn PreRequest>>,
    post_response: Option<Arc<dyn PostResponse>>,
}

impl Middleware {
    /// Creates an entry without hooks for `pattern`, with a generated id.
    #[must_use]
    pub fn new(pattern: PathPattern) -> Self {
        Self {
            id: MiddlewareId::generate(),
            pattern,
            pre_request: None,
            post_response: None,
        }
    }

    /// Creates an entry that applies to every request.
    #[must_use]
    pub fn global() -> Self {
        Self::new(PathPattern::global())
    }

    /// Use an explicit id instead of the generated one.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MiddlewareId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the pre-request hook.
    #[must_use]
    pub fn pre_request(mut self, hook: impl PreRequest) -> Self {
        self.pre_request = Some(Arc::new(hook));
        self
    }

    /// Set the post-response hook.
    #[must_use]
    pub fn post_response(mut self, hook: impl PostResponse) -> Self {
        self.post_response = Some(Arc::new(hook));
        self
    }

    /// Set the pre-request hook from a closure.
    #[must_use]
    pub fn on_request<F>(self, f: F) -> Self
    where
        F: Fn(&mut Request, &AttemptContext) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.pre_request(pre_request_fn(f))
    }

    /// Set the post-response hook from a synchronous closure.
    #[must_use]
    pub fn on_response<F>(self, f: F) -> Self
    where
        F: Fn(&ClassifiedOutcome, &AttemptContext) -> PostAction + Send + Sync + 'static,
    {
        self.post_response(post_response_fn(f))
    }

    /// Set both hooks from one value.
    #[must_use]
    pub fn hooks<H>(self, hooks: H) -> Self
    where
        H: PreRequest + PostResponse,
    {
        let hooks = Arc::new(hooks);
        let mut this = self;
        this.pre_request = Some(Arc::clone(&hooks) as Arc<dyn PreRequest>);
        this.post_response = Some(hooks as Arc<dyn PostResponse>);
        this
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> &MiddlewareId {
        &self.id
    }

    /// Scope of the entry.
    #[must_use]
    pub const fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Returns `true` for entries that apply to every path.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.pattern.is_global()
    }

    pub(crate) fn pre_request_hook(&self) -> Option<&dyn PreRequest> {
        self.pre_request.as_deref()
    }

    pub(crate) fn post_response_hook(&self) -> Option<&dyn PostResponse> {
        self.post_response.as_deref()
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("pre_request", &self.pre_request.is_some())
            .field("post_response", &self.post_response.is_some())
            .finish()
    }
}
