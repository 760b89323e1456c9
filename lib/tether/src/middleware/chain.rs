//! Ordered dispatch over a registry snapshot.

use std::sync::Arc;

use tether_core::{ClassifiedOutcome, NetworkError, Request};
use tracing::debug;

use super::{AttemptContext, Middleware, PostAction};

/// Middleware applicable to one path, split into global and scoped groups.
///
/// Global entries always run before scoped ones; each group keeps
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareChain {
    global: Vec<Arc<Middleware>>,
    scoped: Vec<Arc<Middleware>>,
}

impl MiddlewareChain {
    /// Group a snapshot for `path`. Non-matching entries are dropped.
    #[must_use]
    pub fn new(snapshot: Vec<Arc<Middleware>>, path: &str) -> Self {
        let (global, rest): (Vec<_>, Vec<_>) =
            snapshot.into_iter().partition(|entry| entry.is_global());
        let scoped = rest
            .into_iter()
            .filter(|entry| entry.pattern().matches(path))
            .collect();
        Self { global, scoped }
    }

    /// Entries that apply to every path.
    #[must_use]
    pub fn global(&self) -> &[Arc<Middleware>] {
        &self.global
    }

    /// Entries selected by their pattern.
    #[must_use]
    pub fn scoped(&self) -> &[Arc<Middleware>] {
        &self.scoped
    }

    /// Returns `true` when nothing applies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.scoped.is_empty()
    }

    /// All entries in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Middleware>> {
        self.global.iter().chain(self.scoped.iter())
    }

    /// Run every pre-request hook in order.
    ///
    /// The first failing hook stops the pass; its error is wrapped as
    /// [`NetworkError::MiddlewareError`].
    pub fn run_pre_request(
        &self,
        request: &mut Request,
        ctx: &AttemptContext,
    ) -> Result<(), NetworkError> {
        for entry in self.iter() {
            let Some(hook) = entry.pre_request_hook() else {
                continue;
            };
            if let Err(err) = hook.pre_request(request, ctx) {
                debug!(id = %entry.id(), error = %err, "pre-request hook failed");
                return Err(NetworkError::middleware(err));
            }
        }
        Ok(())
    }

    /// Await every post-response hook in order.
    ///
    /// The first [`PostAction::RequestRetry`] short-circuits the remaining
    /// hooks of both groups.
    pub async fn run_post_response(
        &self,
        outcome: &ClassifiedOutcome,
        ctx: &AttemptContext,
    ) -> PostAction {
        for entry in self.iter() {
            let Some(hook) = entry.post_response_hook() else {
                continue;
            };
            if hook.post_response(outcome, ctx).await == PostAction::RequestRetry {
                debug!(id = %entry.id(), attempt = ctx.attempt(), "middleware requested a retry");
                return PostAction::RequestRetry;
            }
        }
        PostAction::Continue
    }
}
