//! Attempt loop of one logical request.
//!
//! The [`Dispatcher`] is an explicit state machine:
//!
//! ```text
//! Preparing -> PreMiddleware -> Transporting -> PostMiddleware -> Deciding
//!     ^                                                              |
//!     +---------------------- Retrying(delay) <----------------------+
//!                                                                    |
//!                                                 Success | Failed <-+
//! ```
//!
//! Every attempt starts from a freshly prepared request and a fresh registry
//! snapshot. Middleware-requested retries and policy retries draw from the
//! same budget, [`RetryPolicy::max_retries`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tether_core::{
    ClassifiedOutcome, Endpoint, NetworkError, Request, Response, Result, RetryPolicy, Transport,
    classify,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, field, info, info_span, warn};

use crate::middleware::{AttemptContext, MiddlewareChain, MiddlewareRegistry, PostAction};

enum State {
    Preparing {
        attempt: u32,
    },
    PreMiddleware {
        attempt: u32,
        request: Request,
    },
    Transporting {
        request: Request,
        chain: MiddlewareChain,
        ctx: AttemptContext,
    },
    PostMiddleware {
        outcome: ClassifiedOutcome,
        chain: MiddlewareChain,
        ctx: AttemptContext,
    },
    Deciding {
        attempt: u32,
        outcome: ClassifiedOutcome,
        action: PostAction,
    },
    Retrying {
        attempt: u32,
        delay: Duration,
    },
    Success(Response),
    Failed(NetworkError),
}

/// Drives the attempts of one logical request.
///
/// Build one per call; [`Client`](crate::Client) does this for every
/// `execute`.
pub struct Dispatcher<T, E> {
    transport: Arc<T>,
    registry: Arc<MiddlewareRegistry>,
    endpoint: E,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<T, E> std::fmt::Debug for Dispatcher<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("policy", &self.policy)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<T, E> Dispatcher<T, E>
where
    T: Transport,
    E: Endpoint,
{
    /// Creates a dispatcher for `endpoint`.
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        registry: Arc<MiddlewareRegistry>,
        endpoint: E,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            registry,
            endpoint,
            policy,
            cancel,
        }
    }

    /// Run attempts until success, a terminal failure or cancellation.
    pub async fn run(self) -> Result<Response> {
        let span = info_span!(
            "tether_request",
            method = field::Empty,
            path = field::Empty,
            attempt = field::Empty,
        );
        self.drive().instrument(span).await
    }

    async fn drive(self) -> Result<Response> {
        let started = Instant::now();
        let mut state = State::Preparing { attempt: 0 };
        loop {
            state = match state {
                State::Preparing { attempt } => self.prepare(attempt),
                State::PreMiddleware { attempt, request } => self.pre_middleware(attempt, request),
                State::Transporting {
                    request,
                    chain,
                    ctx,
                } => self.execute_attempt(request, chain, ctx).await,
                State::PostMiddleware {
                    outcome,
                    chain,
                    ctx,
                } => self.post_middleware(outcome, chain, ctx).await,
                State::Deciding {
                    attempt,
                    outcome,
                    action,
                } => self.decide(attempt, outcome, action),
                State::Retrying { attempt, delay } => self.retry(attempt, delay).await,
                State::Success(response) => {
                    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    info!(status = response.status().as_u16(), elapsed_ms, "request succeeded");
                    return Ok(response);
                }
                State::Failed(error) => {
                    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    warn!(error = %error, kind = error.kind_name(), elapsed_ms, "request failed");
                    return Err(error);
                }
            };
        }
    }

    fn prepare(&self, attempt: u32) -> State {
        if self.cancel.is_cancelled() {
            return State::Failed(NetworkError::Cancelled);
        }
        match self.endpoint.prepare() {
            Ok(request) => {
                let span = Span::current();
                span.record("method", field::display(request.method()));
                span.record("path", request.path());
                span.record("attempt", attempt);
                State::PreMiddleware { attempt, request }
            }
            Err(error) => State::Failed(error),
        }
    }

    fn pre_middleware(&self, attempt: u32, mut request: Request) -> State {
        let path = request.path().to_owned();
        let chain = self.registry.chain_for(&path);
        let ctx = AttemptContext::new(attempt, self.policy.max_retries(), path);
        match chain.run_pre_request(&mut request, &ctx) {
            Ok(()) => State::Transporting {
                request,
                chain,
                ctx,
            },
            Err(error) => State::Failed(error),
        }
    }

    async fn execute_attempt(
        &self,
        request: Request,
        chain: MiddlewareChain,
        ctx: AttemptContext,
    ) -> State {
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return State::Failed(NetworkError::Cancelled),
            result = self.transport.execute(request) => result,
        };
        State::PostMiddleware {
            outcome: classify(result),
            chain,
            ctx,
        }
    }

    async fn post_middleware(
        &self,
        outcome: ClassifiedOutcome,
        chain: MiddlewareChain,
        ctx: AttemptContext,
    ) -> State {
        let action = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return State::Failed(NetworkError::Cancelled),
            action = chain.run_post_response(&outcome, &ctx) => action,
        };
        State::Deciding {
            attempt: ctx.attempt(),
            outcome,
            action,
        }
    }

    fn decide(&self, attempt: u32, outcome: ClassifiedOutcome, action: PostAction) -> State {
        let attempts_remain = attempt < self.policy.max_retries();
        match (action, outcome) {
            (PostAction::RequestRetry, outcome) if attempts_remain => {
                let delay = outcome.error().map_or_else(
                    || self.policy.backoff(attempt),
                    |error| self.policy.delay(attempt, error),
                );
                State::Retrying { attempt, delay }
            }
            (PostAction::RequestRetry, _) => {
                State::Failed(NetworkError::MiddlewareRetryBudgetExceeded)
            }
            (PostAction::Continue, ClassifiedOutcome::Success(response)) => {
                State::Success(response)
            }
            (
                PostAction::Continue,
                ClassifiedOutcome::RetryableError(error) | ClassifiedOutcome::TerminalError(error),
            ) => {
                if self.policy.should_retry(&error, attempt) {
                    let delay = self.policy.delay(attempt, &error);
                    debug!(error = %error, "retryable failure");
                    State::Retrying { attempt, delay }
                } else if self.policy.max_retries() > 0 && self.policy.retries_on(&error) {
                    State::Failed(NetworkError::RetriesExhausted {
                        attempts: attempt.saturating_add(1),
                        last: Box::new(error),
                    })
                } else {
                    State::Failed(error)
                }
            }
        }
    }

    async fn retry(&self, attempt: u32, delay: Duration) -> State {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        warn!(attempt, delay_ms, "retrying request");
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => State::Failed(NetworkError::Cancelled),
            () = tokio::time::sleep(delay) => State::Preparing { attempt: attempt + 1 },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;

    use bytes::Bytes;
    use tether_core::{BoxError, HeaderMap, Method, PathPattern, StatusCode};

    use super::*;
    use crate::middleware::Middleware;

    type Reply = std::result::Result<Response, BoxError>;

    /// Transport replaying a script, then answering 200.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Reply>>,
        seen: Mutex<Vec<Request>>,
    }

    impl Scripted {
        fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().collect()),
                seen: Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().expect("lock").len()
        }

        fn seen(&self) -> Vec<Request> {
            self.seen.lock().expect("lock").clone()
        }
    }

    impl Transport for Scripted {
        async fn execute(&self, request: Request) -> std::result::Result<Response, BoxError> {
            self.seen.lock().expect("lock").push(request);
            let reply = self.replies.lock().expect("lock").pop_front();
            reply.unwrap_or_else(|| Ok(status(200)))
        }
    }

    /// Transport that never answers.
    struct Hanging;

    impl Transport for Hanging {
        async fn execute(&self, _request: Request) -> std::result::Result<Response, BoxError> {
            std::future::pending().await
        }
    }

    fn status(code: u16) -> Response {
        Response::new(
            StatusCode::from_u16(code).expect("status"),
            HeaderMap::new(),
            Bytes::new(),
        )
    }

    fn with_header(code: u16, name: &'static str, value: &'static str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(name, value.parse().expect("header value"));
        Response::new(StatusCode::from_u16(code).expect("status"), headers, Bytes::new())
    }

    fn request() -> Request {
        let url = url::Url::parse("https://api.example.com/users/42").expect("url");
        Request::builder(Method::GET, url).build().expect("request")
    }

    fn dispatcher<T: Transport>(
        transport: Arc<T>,
        registry: Arc<MiddlewareRegistry>,
        policy: RetryPolicy,
    ) -> Dispatcher<T, Request> {
        Dispatcher::new(transport, registry, request(), policy, CancellationToken::new())
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let transport = Scripted::new([]);
        let response = dispatcher(Arc::clone(&transport), Arc::default(), RetryPolicy::immediate(3))
            .run()
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let transport = Scripted::new([Ok(status(503)), Ok(status(502))]);
        let response = dispatcher(Arc::clone(&transport), Arc::default(), RetryPolicy::immediate(3))
            .run()
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_is_a_distinct_failure() {
        let transport = Scripted::new((0..5).map(|_| Ok(status(503))));
        let error = dispatcher(Arc::clone(&transport), Arc::default(), RetryPolicy::immediate(2))
            .run()
            .await
            .expect_err("exhausted");

        let NetworkError::RetriesExhausted { attempts, last } = error else {
            panic!("unexpected error: {error:?}");
        };
        assert_eq!(attempts, 3);
        assert_eq!(last.status(), Some(503));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let transport = Scripted::new([Ok(status(404))]);
        let error = dispatcher(Arc::clone(&transport), Arc::default(), RetryPolicy::immediate(3))
            .run()
            .await
            .expect_err("not found");
        assert_eq!(error.status(), Some(404));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn no_retry_policy_surfaces_the_classified_error() {
        let transport = Scripted::new([Ok(status(503))]);
        let error = dispatcher(Arc::clone(&transport), Arc::default(), RetryPolicy::none())
            .run()
            .await
            .expect_err("server error");
        assert_eq!(error.status(), Some(503));
        assert!(!error.is_budget_exhausted());
    }

    #[tokio::test]
    async fn raw_transport_failures_are_classified() {
        let transport = Scripted::new([Err(Box::new(io::Error::new(
            io::ErrorKind::TimedOut,
            "deadline",
        )) as BoxError)]);
        let policy = RetryPolicy::immediate(1).with_conditions([tether_core::ErrorCondition::Timeout]);
        let response = dispatcher(Arc::clone(&transport), Arc::default(), policy)
            .run()
            .await
            .expect("retried");
        assert!(response.is_success());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exponential_backoff_waits_between_attempts() {
        let transport = Scripted::new((0..4).map(|_| Ok(status(500))));
        let policy =
            RetryPolicy::exponential(3, Duration::from_secs(1), Duration::from_secs(30));
        let started = tokio::time::Instant::now();
        let error = dispatcher(Arc::clone(&transport), Arc::default(), policy)
            .run()
            .await
            .expect_err("exhausted");

        assert!(error.is_budget_exhausted());
        assert_eq!(transport.calls(), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(8), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_overrides_backoff() {
        let transport = Scripted::new([Ok(with_header(429, "retry-after", "60"))]);
        let policy = RetryPolicy::linear(1, Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        dispatcher(Arc::clone(&transport), Arc::default(), policy)
            .run()
            .await
            .expect("response");

        assert_eq!(transport.calls(), 2);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn failing_pre_hook_aborts_without_transport_call() {
        let registry = Arc::new(MiddlewareRegistry::new());
        registry
            .add(Middleware::global().on_request(|_, _| Err("no token".into())))
            .expect("add");
        let transport = Scripted::new([]);
        let error = dispatcher(Arc::clone(&transport), registry, RetryPolicy::immediate(3))
            .run()
            .await
            .expect_err("aborted");

        assert!(matches!(error, NetworkError::MiddlewareError(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn middleware_retry_uses_the_shared_budget() {
        let registry = Arc::new(MiddlewareRegistry::new());
        registry
            .add(
                Middleware::new(PathPattern::wildcard("/users/*"))
                    .on_response(|_, ctx| {
                        if ctx.attempt() == 0 {
                            PostAction::RequestRetry
                        } else {
                            PostAction::Continue
                        }
                    }),
            )
            .expect("add");
        let transport = Scripted::new([]);
        let response = dispatcher(Arc::clone(&transport), registry, RetryPolicy::immediate(1))
            .run()
            .await
            .expect("response");
        assert!(response.is_success());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn middleware_retry_without_budget_fails() {
        for (policy, expected_calls) in [(RetryPolicy::none(), 1), (RetryPolicy::immediate(2), 3)] {
            let registry = Arc::new(MiddlewareRegistry::new());
            registry
                .add(Middleware::global().on_response(|_, _| PostAction::RequestRetry))
                .expect("add");
            let transport = Scripted::new([]);
            let error = dispatcher(Arc::clone(&transport), registry, policy)
                .run()
                .await
                .expect_err("budget exceeded");

            assert!(matches!(error, NetworkError::MiddlewareRetryBudgetExceeded));
            assert_eq!(transport.calls(), expected_calls);
        }
    }

    #[tokio::test]
    async fn every_attempt_starts_from_a_fresh_request() {
        let registry = Arc::new(MiddlewareRegistry::new());
        registry
            .add(Middleware::global().on_request(|req, ctx| {
                let trail = req.header("x-trail").unwrap_or_default().to_string();
                req.set_header("x-trail", &format!("{trail}[{}]", ctx.attempt()))?;
                Ok(())
            }))
            .expect("add");
        let transport = Scripted::new([Ok(status(503)), Ok(status(503))]);
        dispatcher(Arc::clone(&transport), registry, RetryPolicy::immediate(2))
            .run()
            .await
            .expect("response");

        let trails: Vec<_> = transport
            .seen()
            .iter()
            .map(|req| req.header("x-trail").unwrap_or_default().to_string())
            .collect();
        assert_eq!(trails, ["[0]", "[1]", "[2]"]);
    }

    #[tokio::test]
    async fn prepare_failure_is_terminal() {
        struct Broken;
        impl Endpoint for Broken {
            fn prepare(&self) -> Result<Request> {
                Err(NetworkError::UrlGenerationFailed("missing id".into()))
            }
        }

        let transport = Scripted::new([]);
        let error = Dispatcher::new(
            Arc::clone(&transport),
            Arc::default(),
            Broken,
            RetryPolicy::immediate(3),
            CancellationToken::new(),
        )
        .run()
        .await
        .expect_err("no url");
        assert!(matches!(error, NetworkError::UrlGenerationFailed(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn cancelling_in_flight_transport() {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            Dispatcher::new(
                Arc::new(Hanging),
                Arc::default(),
                request(),
                RetryPolicy::immediate(3),
                cancel.clone(),
            )
            .run(),
        );
        tokio::task::yield_now().await;
        cancel.cancel();

        let error = task.await.expect("join").expect_err("cancelled");
        assert!(error.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_pending_retry_timer() {
        let transport = Scripted::new((0..4).map(|_| Ok(status(503))));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            Dispatcher::new(
                Arc::clone(&transport),
                Arc::default(),
                request(),
                RetryPolicy::linear(3, Duration::from_secs(10)),
                cancel.clone(),
            )
            .run(),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let error = task.await.expect("join").expect_err("cancelled");
        assert!(error.is_cancelled());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn already_cancelled_never_calls_transport() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let transport = Scripted::new([]);
        let error = Dispatcher::new(
            Arc::clone(&transport),
            Arc::default(),
            request(),
            RetryPolicy::none(),
            cancel,
        )
        .run()
        .await
        .expect_err("cancelled");
        assert!(error.is_cancelled());
        assert_eq!(transport.calls(), 0);
    }
}
