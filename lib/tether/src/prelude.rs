//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types for easy glob
//! importing:
//!
//! ```ignore
//! use tether::prelude::*;
//! ```

pub use crate::middleware::{
    AttemptContext, BearerAuth, Logging, Middleware, MiddlewareId, PostAction,
};
pub use crate::{
    CancellationToken, Client, ClientConfig, Endpoint, ErrorCondition, Method, NetworkError,
    PathPattern, Request, RequestHandle, Response, Result, RetryPolicy, StatusCode, Transport,
    header,
};
pub use serde::Deserialize;
