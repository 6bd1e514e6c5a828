// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]

//! # CRM SDK Core
//!
//! The runtime shared by every resource service of the CRM SDK: one HTTP
//! round trip per call, typed errors for non-2xx answers, ordered per-call
//! options and a lazy cursor pager.
//!
//! ## Features
//!
//! - **Raw Client**: URL resolution, query merging, JSON/form/multipart/raw bodies
//! - **Request Options**: headers, context values and request editors, applied in order
//! - **Error Classification**: rate limits with a computed retry time, other statuses with body
//! - **Cursor Pagination**: lazy, single-pass, stops early, never re-fetches after failure
//! - **Call Context**: cancellation token, deadline and metadata per call
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crm_sdk_core::{ApiRequest, CallContext, ClientConfig, HttpClient, RequestOption, Result};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::builder("https://acme.crm.example.com/api/v1")
//!         .api_token("my-token")
//!         .build();
//!     let client = HttpClient::new(config)?;
//!     let ctx = CallContext::new();
//!
//!     // One call
//!     let deal: Value = client
//!         .call(
//!             &ctx,
//!             ApiRequest::get("deals/42").with_option(RequestOption::header("X-Trace", "abc")),
//!         )
//!         .await?;
//!
//!     // Every deal, page by page
//!     let mut deals = client.paginate::<Value>(&ctx, "deals", Default::default(), vec![]);
//!     while let Some(deal) = deals.next().await? {
//!         println!("{deal}");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Resource services                        │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────────┬───────────────┴──┬───────────────┬────────────┐
//! │ CursorPager  │   HttpClient     │ RequestOption │  Classifier│
//! ├──────────────┼──────────────────┼───────────────┼────────────┤
//! │ next()       │ call()           │ header        │ 429 → hint │
//! │ for_each()   │ call_into()      │ context_value │ Retry-After│
//! │ into_stream()│ paginate()       │ editor        │ status+body│
//! └──────────────┴──────────────────┴───────────────┴────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Per-call cancellation, deadline and metadata
pub mod context;

/// Client configuration
pub mod config;

/// Static credentials
pub mod auth;

/// HTTP client, request options and error classification
pub mod http;

/// Cursor pagination
pub mod pagination;

/// Opt-in retries above the raw client
pub mod retry;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result, ResultExt};
pub use types::*;

// Re-export commonly used types
pub use auth::Auth;
pub use config::{ClientConfig, ClientSettings};
pub use context::CallContext;
pub use http::{ApiError, ApiRequest, HttpClient, Query, RateLimitError, RequestBody, RequestOption};
pub use pagination::{CursorPager, ListResponse, Page};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
