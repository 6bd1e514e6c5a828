//! Request values handed to the raw client
//!
//! `ApiRequest` bundles everything one call needs: method, path, query,
//! body and the ordered request options.

use super::options::RequestOption;
use crate::error::{Error, Result};
use crate::types::{JsonValue, Method};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashSet;
use url::Url;

// ============================================================================
// Query
// ============================================================================

/// Ordered query parameters. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Create an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping existing values for the same key
    #[must_use]
    pub fn append(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Replace every value of `key` with a single value
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.remove(&key);
        self.pairs.push((key, value.into()));
        self
    }

    /// Append a value in place
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Drop every value of `key`
    pub fn remove(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    /// First value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of `key`, in insertion order
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Check if `key` has at least one value
    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Iterate over all pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `overrides` on top of `self`.
    ///
    /// Every key present in `overrides` loses all of its values from `self`;
    /// the override values are appended in their original order, so
    /// multi-valued keys survive intact.
    #[must_use]
    pub fn merge(&self, overrides: &Query) -> Query {
        let overridden: HashSet<&str> = overrides.pairs.iter().map(|(k, _)| k.as_str()).collect();

        let mut pairs: Vec<(String, String)> = self
            .pairs
            .iter()
            .filter(|(k, _)| !overridden.contains(k.as_str()))
            .cloned()
            .collect();
        pairs.extend(overrides.pairs.iter().cloned());

        Query { pairs }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Query {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.pairs
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

/// Check if `path` is a full URL rather than a path below the base URL
pub(crate) fn is_absolute(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Join `path` onto `base_url` and merge query parameters.
///
/// Precedence, lowest first: client defaults, query embedded in `path`,
/// per-call `query`. Absolute URLs in `path` are used as-is. Embedded
/// parameters nobody overrides are sent exactly as written.
pub(crate) fn resolve_url(
    base_url: &str,
    path: &str,
    defaults: &Query,
    query: &Query,
) -> Result<Url> {
    let joined = if is_absolute(path) {
        path.to_string()
    } else {
        let base = base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    };

    let mut url = Url::parse(&joined)?;

    let embedded: Vec<String> = url
        .query()
        .map(|q| {
            q.split('&')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let embedded_keys: HashSet<String> = embedded.iter().map(|s| segment_key(s)).collect();

    let kept_defaults: Query = defaults
        .pairs
        .iter()
        .filter(|(k, _)| !embedded_keys.contains(k) && !query.contains_key(k))
        .cloned()
        .collect();

    let mut parts = Vec::with_capacity(embedded.len() + 2);
    if !kept_defaults.is_empty() {
        parts.push(encode_pairs(&kept_defaults));
    }
    parts.extend(
        embedded
            .into_iter()
            .filter(|segment| !query.contains_key(&segment_key(segment))),
    );
    if !query.is_empty() {
        parts.push(encode_pairs(query));
    }

    if parts.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&parts.join("&")));
    }

    Ok(url)
}

/// Decoded key of one raw `key=value` query segment
fn segment_key(segment: &str) -> String {
    url::form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(k, _)| k.into_owned())
        .unwrap_or_default()
}

fn encode_pairs(query: &Query) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.pairs.iter())
        .finish()
}

// ============================================================================
// Body
// ============================================================================

/// Outgoing request body
#[derive(Debug, Default)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// Serialized as `application/json`
    Json(JsonValue),
    /// URL-encoded form
    Form(Query),
    /// Sent unmodified with the caller's content type
    Raw { bytes: Bytes, content_type: String },
    /// Multipart upload, sent unmodified
    Multipart(reqwest::multipart::Form),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

// ============================================================================
// Request
// ============================================================================

/// One call against the API
#[derive(Debug)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL
    pub path: String,
    /// Per-call query parameters (override client defaults key by key)
    pub query: Query,
    /// Request body
    pub body: RequestBody,
    /// Options applied in order just before sending
    pub options: Vec<RequestOption>,
}

impl ApiRequest {
    /// Create a request with no query, body or options
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Query::new(),
            body: RequestBody::Empty,
            options: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push(key, value);
        self
    }

    /// Replace all values of a query parameter
    #[must_use]
    pub fn query_set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query = self.query.set(key, value);
        self
    }

    /// Append every pair of `query`
    #[must_use]
    pub fn with_query(mut self, query: Query) -> Self {
        self.query.extend(query.pairs);
        self
    }

    /// Serialize `body` as the JSON payload
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| Error::encode(e.to_string()))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    /// Use an already-built JSON payload
    #[must_use]
    pub fn json_value(mut self, body: JsonValue) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Send a URL-encoded form
    #[must_use]
    pub fn form(mut self, form: Query) -> Self {
        self.body = RequestBody::Form(form);
        self
    }

    /// Send raw bytes with an explicit content type
    #[must_use]
    pub fn raw(mut self, bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.body = RequestBody::Raw {
            bytes: bytes.into(),
            content_type: content_type.into(),
        };
        self
    }

    /// Send a multipart form
    #[must_use]
    pub fn multipart(mut self, form: reqwest::multipart::Form) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// Add an option. `None` is ignored.
    #[must_use]
    pub fn with_option(mut self, option: impl Into<Option<RequestOption>>) -> Self {
        if let Some(option) = option.into() {
            self.options.push(option);
        }
        self
    }

    /// Add several options in order. `None` entries are ignored.
    #[must_use]
    pub fn with_options<I, O>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<Option<RequestOption>>,
    {
        self.options
            .extend(options.into_iter().filter_map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASE: &str = "https://acme.crm.example.com/api/v1/";

    fn query(pairs: &[(&str, &str)]) -> Query {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_join_trims_slashes() {
        let url = resolve_url(BASE, "/deals/1", &Query::new(), &Query::new()).unwrap();
        assert_eq!(url.as_str(), "https://acme.crm.example.com/api/v1/deals/1");
    }

    #[test]
    fn test_absolute_path_used_as_is() {
        let url = resolve_url(
            BASE,
            "https://files.example.com/d/9",
            &Query::new(),
            &Query::new(),
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://files.example.com/d/9");
        assert!(is_absolute("http://x.example.com"));
        assert!(!is_absolute("deals"));
    }

    #[test]
    fn test_untouched_embedded_query_kept_verbatim() {
        let url = resolve_url(BASE, "files/1?download&ids=1,2", &Query::new(), &Query::new())
            .unwrap();
        assert_eq!(url.query(), Some("download&ids=1,2"));

        let url = resolve_url(
            BASE,
            "files/1?download&ids=1,2",
            &query(&[("lang", "en")]),
            &query(&[("v", "2")]),
        )
        .unwrap();
        assert_eq!(url.query(), Some("lang=en&download&ids=1,2&v=2"));
    }

    #[test]
    fn test_precedence_defaults_embedded_per_call() {
        let url = resolve_url(
            BASE,
            "deals?limit=50&status=open",
            &query(&[("limit", "100"), ("status", "all"), ("lang", "en")]),
            &query(&[("status", "won"), ("ids", "1"), ("ids", "2")]),
        )
        .unwrap();

        assert_eq!(
            url.query(),
            Some("lang=en&limit=50&status=won&ids=1&ids=2")
        );
    }

    #[test]
    fn test_no_query_at_all() {
        let url = resolve_url(BASE, "deals?", &Query::new(), &Query::new()).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_query_merge_drops_overridden_keys() {
        let base = query(&[("a", "1"), ("b", "2"), ("a", "3")]);
        let merged = base.merge(&query(&[("a", "9")]));

        assert_eq!(merged, query(&[("b", "2"), ("a", "9")]));
        assert_eq!(merged.get_all("a"), vec!["9"]);
    }
}
