//! Pagination types
//!
//! `Page` is what a fetch function hands back to the pager. `ListResponse`
//! is the envelope the CRM's list endpoints answer with.

use serde::{Deserialize, Serialize};

/// One fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in server order
    pub items: Vec<T>,
    /// Cursor of the following page; `None` on the last page
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// A page followed by another one at `cursor`.
    ///
    /// An empty `cursor` marks the last page.
    pub fn new(items: Vec<T>, cursor: impl Into<String>) -> Self {
        let cursor = cursor.into();
        Self {
            items,
            next_cursor: (!cursor.is_empty()).then_some(cursor),
        }
    }

    /// The final page
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    /// Check if another page follows
    pub fn has_more(&self) -> bool {
        self.next_cursor.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Pagination metadata of a list response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalData {
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// `{ "success": .., "data": [..], "additional_data": { "next_cursor": .. } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ListResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<Vec<T>>,
    #[serde(default)]
    pub additional_data: Option<AdditionalData>,
}

impl<T> ListResponse<T> {
    /// Cursor of the next page, if any
    pub fn next_cursor(&self) -> Option<&str> {
        self.additional_data
            .as_ref()
            .and_then(|a| a.next_cursor.as_deref())
            .filter(|c| !c.is_empty())
    }
}

impl<T> From<ListResponse<T>> for Page<T> {
    fn from(response: ListResponse<T>) -> Self {
        let next_cursor = response.next_cursor().map(str::to_string);
        Self {
            items: response.data.unwrap_or_default(),
            next_cursor,
        }
    }
}

/// Where a pager is in its traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagerState {
    /// More pages may follow
    Fetching,
    /// Last page consumed
    Done,
    /// A fetch failed; holds the failure message
    Failed(String),
}
