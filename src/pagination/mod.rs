//! Pagination module
//!
//! Cursor pagination: each page carries the cursor of the next one, and an
//! empty or missing cursor marks the end.
//!
//! # Overview
//!
//! `CursorPager` drives any fetch function returning `Page<T>`.
//! `HttpClient::paginate` wires it to list endpoints that answer with the
//! `ListResponse` envelope.

mod pager;
mod types;

pub use pager::CursorPager;
pub use types::{AdditionalData, ListResponse, Page, PagerState};

#[cfg(test)]
mod tests;
