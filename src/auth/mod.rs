//! Authentication module
//!
//! Supports: API Token (query or header), Bearer, Basic
//!
//! Token exchange flows are out of scope; callers that obtain tokens
//! elsewhere pass them in as `Auth::Bearer` or per call with
//! `RequestOption::bearer_token`.

mod types;

pub use types::{Auth, Location, DEFAULT_TOKEN_PARAM};
