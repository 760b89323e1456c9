//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types for easy glob importing:
//!
//! ```ignore
//! use tether_core::prelude::*;
//! ```

pub use crate::{
    ClassifiedOutcome, Endpoint, ErrorCondition, Method, NetworkError, PathPattern, Request,
    Response, Result, RetryPolicy, Transport,
};
