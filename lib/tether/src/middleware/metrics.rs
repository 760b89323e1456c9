//! Metrics hooks using the metrics crate facade.
//!
//! Records attempt and outcome counters with the `metrics` crate, which allows
//! integration with various metrics backends (Prometheus, `StatsD`, etc.).

use futures_util::future::BoxFuture;
use tether_core::{BoxError, ClassifiedOutcome, Request};

use super::{AttemptContext, PostAction, PostResponse, PreRequest};

/// Labels used for metrics.
const LABEL_METHOD: &str = "method";
const LABEL_OUTCOME: &str = "outcome";
const LABEL_KIND: &str = "kind";

/// Metric names.
const METRIC_ATTEMPTS_TOTAL: &str = "tether_attempts_total";
const METRIC_RETRIES_TOTAL: &str = "tether_retries_total";
const METRIC_OUTCOMES_TOTAL: &str = "tether_outcomes_total";

/// Hooks that record pipeline metrics.
///
/// Records the following metrics:
/// - `tether_attempts_total` (counter): attempts sent, labeled by method
/// - `tether_retries_total` (counter): attempts after the first one
/// - `tether_outcomes_total` (counter): classified outcomes, labeled by
///   outcome (`success`, `retryable`, `terminal`) and error kind
///
/// ```ignore
/// use tether::middleware::{Metrics, Middleware};
///
/// client.add_middleware(Middleware::global().hooks(Metrics::new()))?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    _private: (),
}

impl Metrics {
    /// Create metrics hooks.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl PreRequest for Metrics {
    fn pre_request(&self, request: &mut Request, ctx: &AttemptContext) -> Result<(), BoxError> {
        let method = request.method().to_string();
        if ctx.attempt() > 0 {
            metrics::counter!(METRIC_RETRIES_TOTAL, LABEL_METHOD => method.clone()).increment(1);
        }
        metrics::counter!(METRIC_ATTEMPTS_TOTAL, LABEL_METHOD => method).increment(1);
        Ok(())
    }
}

impl PostResponse for Metrics {
    fn post_response<'a>(
        &'a self,
        outcome: &'a ClassifiedOutcome,
        _ctx: &'a AttemptContext,
    ) -> BoxFuture<'a, PostAction> {
        let (label, kind) = match outcome {
            ClassifiedOutcome::Success(_) => ("success", "none"),
            ClassifiedOutcome::RetryableError(error) => ("retryable", error.kind_name()),
            ClassifiedOutcome::TerminalError(error) => ("terminal", error.kind_name()),
        };
        metrics::counter!(
            METRIC_OUTCOMES_TOTAL,
            LABEL_OUTCOME => label,
            LABEL_KIND => kind
        )
        .increment(1);
        Box::pin(std::future::ready(PostAction::Continue))
    }
}
