//! HTTP client module
//!
//! The runtime every resource service calls into.
//!
//! # Features
//!
//! - **Raw Client**: one round trip per call, JSON in and out, no retries
//! - **Request Options**: ordered per-call headers, context values, editors
//! - **Error Classification**: rate limits (with retry hint) vs. other statuses
//! - **Transport Factory**: shared `reqwest::Client`, or a caller-supplied one
//! - **Pacing**: optional token bucket using governor

mod classify;
mod client;
pub(crate) mod options;
mod rate_limit;
mod request;
mod transport;

pub use classify::{
    classify_status, ApiError, Classifier, RateLimitError, RetryAfterSource, StatusClass,
    DEFAULT_RETRY_AFTER,
};
pub use client::{HttpClient, CURSOR_PARAM};
pub use options::{apply_options, run_editors, CallOptions, RequestEditor, RequestOption};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use request::{ApiRequest, Query, RequestBody};
pub use transport::build_client;
