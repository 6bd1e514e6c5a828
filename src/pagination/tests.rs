//! Tests for pagination module

use super::*;
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::types::Cursor;
use futures::future::{ready, Ready};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Calls = Arc<Mutex<Vec<Cursor>>>;

/// Fetch function replaying `pages` in order and recording every cursor
fn scripted(
    pages: Vec<Result<Page<&'static str>>>,
) -> (
    impl FnMut(CallContext, Cursor) -> Ready<Result<Page<&'static str>>>,
    Calls,
) {
    let calls: Calls = Arc::default();
    let recorded = Arc::clone(&calls);
    let mut pages: VecDeque<_> = pages.into();

    let fetch = move |_ctx: CallContext, cursor: Cursor| {
        recorded.lock().unwrap().push(cursor);
        ready(pages.pop_front().unwrap_or_else(|| Ok(Page::last(vec![]))))
    };
    (fetch, calls)
}

fn calls(calls: &Calls) -> Vec<Cursor> {
    calls.lock().unwrap().clone()
}

// ============================================================================
// Page / ListResponse Tests
// ============================================================================

#[test]
fn test_page_constructors() {
    let page = Page::new(vec![1, 2], "c2");
    assert_eq!(page.next_cursor.as_deref(), Some("c2"));
    assert!(page.has_more());

    let page = Page::new(vec![3], "");
    assert_eq!(page.next_cursor, None);
    assert!(!page.has_more());

    assert!(!Page::<u8>::last(vec![]).has_more());
}

#[test]
fn test_list_response_envelope() {
    let response: ListResponse<u32> = serde_json::from_value(json!({
        "success": true,
        "data": [1, 2, 3],
        "additional_data": {"next_cursor": "eyJpZCI6M30"}
    }))
    .unwrap();

    assert!(response.success);
    assert_eq!(response.next_cursor(), Some("eyJpZCI6M30"));

    let page = Page::from(response);
    assert_eq!(page.items, vec![1, 2, 3]);
    assert_eq!(page.next_cursor.as_deref(), Some("eyJpZCI6M30"));
}

#[test]
fn test_list_response_null_data_and_missing_cursor() {
    let response: ListResponse<u32> = serde_json::from_value(json!({
        "success": true,
        "data": null,
        "additional_data": {"next_cursor": null}
    }))
    .unwrap();
    let page = Page::from(response);
    assert!(page.items.is_empty());
    assert_eq!(page.next_cursor, None);

    let response: ListResponse<u32> = serde_json::from_value(json!({"success": true})).unwrap();
    assert_eq!(Page::from(response), Page::last(vec![]));

    let response: ListResponse<u32> = serde_json::from_value(json!({
        "data": [7],
        "additional_data": {"next_cursor": ""}
    }))
    .unwrap();
    assert_eq!(Page::from(response), Page::last(vec![7]));
}

// ============================================================================
// Traversal Tests
// ============================================================================

#[tokio::test]
async fn test_two_page_listing() {
    let (fetch, recorded) = scripted(vec![
        Ok(Page::new(vec!["a", "b"], "c2")),
        Ok(Page::new(vec!["c"], "")),
    ]);
    let mut pager = CursorPager::new(CallContext::new(), fetch);

    let mut seen = Vec::new();
    pager
        .for_each(|item| {
            seen.push(item);
            Ok(ControlFlow::Continue(()))
        })
        .await
        .unwrap();

    assert_eq!(seen, vec!["a", "b", "c"]);
    assert_eq!(calls(&recorded), vec![None, Some("c2".to_string())]);
    assert_eq!(pager.pages_fetched(), 2);
    assert!(pager.is_done());
}

#[tokio::test]
async fn test_terminates_on_missing_cursor_and_keeps_order() {
    let (fetch, recorded) = scripted(vec![
        Ok(Page::new(vec!["1", "2"], "p2")),
        Ok(Page::new(vec![], "p3")),
        Ok(Page::new(vec!["3"], "p4")),
        Ok(Page::last(vec!["4", "5"])),
    ]);
    let mut pager = CursorPager::new(CallContext::new(), fetch);

    let items = pager.collect_all().await.unwrap();

    assert_eq!(items, vec!["1", "2", "3", "4", "5"]);
    assert_eq!(calls(&recorded).len(), 4);
    assert_eq!(pager.cursor(), None);

    // Exhausted pagers stay exhausted without fetching
    assert_eq!(pager.next().await.unwrap(), None);
    assert_eq!(calls(&recorded).len(), 4);
}

#[tokio::test]
async fn test_early_stop_fetches_no_further_pages() {
    let (fetch, recorded) = scripted(vec![
        Ok(Page::new(vec!["a", "b"], "c2")),
        Ok(Page::new(vec!["c", "d"], "c3")),
        Ok(Page::last(vec!["e"])),
    ]);
    let mut pager = CursorPager::new(CallContext::new(), fetch);

    let mut seen = Vec::new();
    pager
        .for_each(|item| {
            seen.push(item);
            Ok(if seen.len() == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })
        .await
        .unwrap();

    assert_eq!(seen, vec!["a", "b", "c"]);
    assert_eq!(calls(&recorded).len(), 2);
    assert_eq!(pager.cursor(), Some("c3"));
    assert!(!pager.is_done());
}

#[tokio::test]
async fn test_fetch_error_short_circuits() {
    let (fetch, recorded) = scripted(vec![
        Ok(Page::new(vec!["a"], "c2")),
        Ok(Page::new(vec!["b"], "c3")),
        Err(Error::Other("boom".to_string())),
        Ok(Page::last(vec!["never"])),
    ]);
    let mut pager = CursorPager::new(CallContext::new(), fetch);

    let mut seen = Vec::new();
    let err = pager
        .for_each(|item| {
            seen.push(item);
            Ok(ControlFlow::Continue(()))
        })
        .await
        .unwrap_err();

    assert_eq!(seen, vec!["a", "b"]);
    assert!(matches!(err, Error::Other(ref m) if m == "boom"));
    assert_eq!(calls(&recorded).len(), 3);
    assert!(pager.is_failed());

    // The failure is re-surfaced, never re-fetched
    let err = pager.next().await.unwrap_err();
    assert!(matches!(err, Error::PaginationFailed { ref message } if message.contains("boom")));
    assert_eq!(calls(&recorded).len(), 3);
}

#[tokio::test]
async fn test_callback_error_stops_traversal() {
    let (fetch, recorded) = scripted(vec![
        Ok(Page::new(vec!["a", "b"], "c2")),
        Ok(Page::last(vec!["c"])),
    ]);
    let mut pager = CursorPager::new(CallContext::new(), fetch);

    let err = pager
        .for_each(|item| {
            if item == "b" {
                return Err(Error::Other("bad item".to_string()));
            }
            Ok(ControlFlow::Continue(()))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Other(_)));
    assert_eq!(calls(&recorded).len(), 1);
    assert!(!pager.is_failed());
}

#[tokio::test]
async fn test_resume_from_cursor() {
    let (fetch, recorded) = scripted(vec![Ok(Page::last(vec!["z"]))]);
    let mut pager = CursorPager::new(CallContext::new(), fetch).with_cursor("saved");

    assert_eq!(pager.cursor(), Some("saved"));
    assert_eq!(pager.collect_all().await.unwrap(), vec!["z"]);
    assert_eq!(calls(&recorded), vec![Some("saved".to_string())]);

    let (fetch, recorded) = scripted(vec![Ok(Page::last(vec!["a"]))]);
    let mut pager = CursorPager::new(CallContext::new(), fetch).with_cursor("");
    pager.collect_all().await.unwrap();
    assert_eq!(calls(&recorded), vec![None]);
}

#[tokio::test]
async fn test_cancelled_context_aborts_fetch() {
    let ctx = CallContext::new();
    let fetches = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&fetches);

    let mut pager = CursorPager::new(ctx.clone(), move |_ctx, _cursor| {
        *counter.lock().unwrap() += 1;
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, Error>(Page::last(vec![1u32]))
        }
    });

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = pager.next().await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(*fetches.lock().unwrap(), 1);

    let err = pager.next().await.unwrap_err();
    assert!(matches!(err, Error::PaginationFailed { .. }));
    assert_eq!(*fetches.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_fetch_receives_pager_context() {
    let ctx = CallContext::new().with_value("tenant", "acme");
    let mut pager = CursorPager::new(ctx, |ctx: CallContext, _cursor| {
        let tenant = ctx.value("tenant").cloned();
        ready(Ok::<_, Error>(Page::last(vec![tenant])))
    });

    let items = pager.collect_all().await.unwrap();
    assert_eq!(items, vec![Some(json!("acme"))]);
}

#[tokio::test]
async fn test_into_stream_ends_after_error() {
    let (fetch, _) = scripted(vec![
        Ok(Page::new(vec!["a"], "c2")),
        Err(Error::Other("down".to_string())),
    ]);
    let pager = CursorPager::new(CallContext::new(), fetch);

    let results: Vec<Result<&str>> = pager.into_stream().collect().await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &"a");
    assert!(results[1].is_err());
}

#[tokio::test]
async fn test_debug_output() {
    let (fetch, _) = scripted(vec![]);
    let pager = CursorPager::new(CallContext::new(), fetch).with_cursor("abc");

    let rendered = format!("{pager:?}");
    assert!(rendered.contains("Fetching"));
    assert!(rendered.contains("abc"));
}
