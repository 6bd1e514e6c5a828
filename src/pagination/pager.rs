//! Cursor pager
//!
//! Lazily walks a cursor-paginated listing one page at a time. The pager
//! owns the fetch function and the cursor; callers only pull items.

use super::types::{Page, PagerState};
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::types::{Cursor, OptionStringExt};
use futures::Stream;
use std::collections::VecDeque;
use std::future::Future;
use std::ops::ControlFlow;
use tracing::{debug, warn};

/// Single-pass iterator over every item of a paginated listing
///
/// `fetch` is called with the pager's context and the current cursor
/// (`None` for the first page) and returns one `Page`.
pub struct CursorPager<T, F> {
    ctx: CallContext,
    fetch: F,
    cursor: Cursor,
    buffer: VecDeque<T>,
    state: PagerState,
    pages_fetched: usize,
}

impl<T, F, Fut> CursorPager<T, F>
where
    F: FnMut(CallContext, Cursor) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    /// Create a pager that starts from the first page
    pub fn new(ctx: CallContext, fetch: F) -> Self {
        Self {
            ctx,
            fetch,
            cursor: None,
            buffer: VecDeque::new(),
            state: PagerState::Fetching,
            pages_fetched: 0,
        }
    }

    /// Resume from a cursor saved by an earlier traversal
    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = cursor.into().none_if_empty();
        self
    }

    /// Pull the next item.
    ///
    /// Returns `Ok(None)` once the last page is exhausted. After a failed
    /// fetch every pull returns `Error::PaginationFailed` without fetching.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }

            match &self.state {
                PagerState::Fetching => {}
                PagerState::Done => return Ok(None),
                PagerState::Failed(message) => {
                    return Err(Error::PaginationFailed {
                        message: message.clone(),
                    })
                }
            }

            let items = self.fetch_page().await?;
            self.buffer.extend(items);
        }
    }

    /// Visit every item in order.
    ///
    /// The callback returns `ControlFlow::Break` to stop early; no further
    /// page is fetched after that. A callback error ends the traversal and
    /// is returned as is.
    pub async fn for_each<C>(&mut self, mut callback: C) -> Result<()>
    where
        C: FnMut(T) -> Result<ControlFlow<()>>,
    {
        while let Some(item) = self.next().await? {
            if callback(item)?.is_break() {
                debug!("Pagination stopped by caller after {} pages", self.pages_fetched);
                break;
            }
        }
        Ok(())
    }

    /// Drain the remaining items into a vector
    pub async fn collect_all(&mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Turn the pager into a stream. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        futures::stream::unfold(Some(self), |pager| async move {
            let mut pager = pager?;
            match pager.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(pager))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    async fn fetch_page(&mut self) -> Result<Vec<T>> {
        let cursor = self.cursor.clone();
        debug!(
            "Fetching page {} (cursor: {})",
            self.pages_fetched + 1,
            cursor.as_deref().unwrap_or("<start>")
        );

        let result = self
            .ctx
            .run((self.fetch)(self.ctx.clone(), cursor))
            .await;
        self.pages_fetched += 1;

        match result {
            Ok(Page { items, next_cursor }) => {
                self.cursor = next_cursor.none_if_empty();
                if self.cursor.is_none() {
                    debug!("Pagination complete after {} pages", self.pages_fetched);
                    self.state = PagerState::Done;
                }
                Ok(items)
            }
            Err(e) => {
                warn!("Page fetch {} failed: {}", self.pages_fetched, e);
                self.state = PagerState::Failed(e.to_string());
                Err(e)
            }
        }
    }
}

impl<T, F> CursorPager<T, F> {
    /// Cursor the next fetch will use; save it to resume later
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Number of fetch attempts so far, failed ones included
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Current traversal state
    pub fn state(&self) -> &PagerState {
        &self.state
    }

    /// Check if every page was fetched and every item yielded
    pub fn is_done(&self) -> bool {
        self.state == PagerState::Done && self.buffer.is_empty()
    }

    /// Check if a fetch failed
    pub fn is_failed(&self) -> bool {
        matches!(self.state, PagerState::Failed(_))
    }
}

impl<T, F> std::fmt::Debug for CursorPager<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorPager")
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("buffered", &self.buffer.len())
            .field("pages_fetched", &self.pages_fetched)
            .finish_non_exhaustive()
    }
}
