//! Request/outcome logging hooks.
//!
//! Logs every attempt and its classified outcome using the `tracing` crate.
//! Events are emitted inside the dispatcher's `tether_request` span, so the
//! method, path and attempt number are already attached.

use futures_util::future::BoxFuture;
use tether_core::{BoxError, ClassifiedOutcome, Request};
use tracing::{debug, info, warn};

use super::{AttemptContext, PostAction, PostResponse, PreRequest};

/// Log level for the logging hooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Log at debug level (request/response details).
    Debug,
    /// Log at info level (summary only).
    #[default]
    Info,
}

/// Pre-request and post-response hooks that log traffic.
///
/// Register with [`super::Middleware::hooks`]:
///
/// ```ignore
/// use tether::middleware::{Logging, Middleware};
///
/// client.add_middleware(Middleware::global().hooks(Logging::debug()))?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Logging {
    level: LogLevel,
}

impl Logging {
    /// Create logging hooks with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create logging hooks that log at debug level.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
        }
    }

    /// Configured level.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }
}

impl PreRequest for Logging {
    fn pre_request(&self, request: &mut Request, ctx: &AttemptContext) -> Result<(), BoxError> {
        let method = request.method();
        let url = request.url().as_str();
        match self.level {
            LogLevel::Debug => {
                debug!(
                    %method,
                    url,
                    attempt = ctx.attempt(),
                    headers = ?request.headers(),
                    "sending request"
                );
            }
            LogLevel::Info => {
                info!(%method, url, attempt = ctx.attempt(), "sending request");
            }
        }
        Ok(())
    }
}

impl PostResponse for Logging {
    fn post_response<'a>(
        &'a self,
        outcome: &'a ClassifiedOutcome,
        ctx: &'a AttemptContext,
    ) -> BoxFuture<'a, PostAction> {
        let attempt = ctx.attempt();
        match outcome {
            ClassifiedOutcome::Success(response) => {
                let status = response.status().as_u16();
                match self.level {
                    LogLevel::Debug => debug!(
                        status,
                        attempt,
                        body_len = response.body().len(),
                        "request completed"
                    ),
                    LogLevel::Info => info!(status, attempt, "request completed"),
                }
            }
            ClassifiedOutcome::RetryableError(error) => {
                warn!(error = %error, attempt, retryable = true, "request failed");
            }
            ClassifiedOutcome::TerminalError(error) => {
                warn!(error = %error, attempt, retryable = false, "request failed");
            }
        }
        Box::pin(std::future::ready(PostAction::Continue))
    }
}
