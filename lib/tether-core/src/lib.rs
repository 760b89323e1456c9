//! Core types for the tether HTTP request pipeline.
//!
//! This crate provides the leaf building blocks used by `tether`:
//! - [`PathPattern`] - path matching strategies used to scope middleware
//! - [`NetworkError`] and [`ErrorCondition`] - the classified error taxonomy
//! - [`ClassifiedOutcome`] and [`classify`] - boundary classification of transport results
//! - [`RetryPolicy`] and [`RetryConfig`] - retry eligibility and backoff
//! - [`Request`], [`RequestBuilder`] and [`Response`] - HTTP message types
//! - [`Transport`] and [`Endpoint`] - collaborators consumed by the pipeline

mod classify;
mod client;
mod error;
pub mod path_pattern;
pub mod prelude;
mod request;
mod response;
mod retry;

pub use classify::{
    ClassifiedOutcome, classify, classify_response, classify_transport_error, parse_retry_after,
};
pub use client::{Endpoint, Transport, WithRetry};
pub use error::{BoxError, Cause, ErrorCondition, NetworkError, Result};
pub use path_pattern::{PathPattern, PatternError};
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use retry::{RetryConfig, RetryPolicy, RetryStrategy, StrategyKind};

// Re-export http crate types for methods, status codes and headers
pub use http::{HeaderMap, Method, StatusCode, header};
