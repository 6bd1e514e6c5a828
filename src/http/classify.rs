//! Classification of non-2xx responses
//!
//! Turns status, headers and body of a failed response into an `ApiError`.
//! Classification is pure: the observation time is passed in, never read
//! from the wall clock, and it cannot fail. Unusable rate-limit hints fall
//! back to the configured default delay.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

/// Delay used for 429 responses that carry no usable hint
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Header some CRM deployments use for "seconds until the window resets"
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Body fields checked for a retry hint, in order
const BODY_RETRY_FIELDS: [&str; 2] = ["retry_after", "retryAfter"];

/// A classified non-2xx response
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error(
        "Rate limited (HTTP {}), retry after {}s",
        .0.status,
        .0.retry_after.as_secs()
    )]
    RateLimited(RateLimitError),

    #[error("HTTP {status}: {}", String::from_utf8_lossy(.body))]
    Status { status: u16, body: Bytes },
}

impl ApiError {
    /// Create a generic status error
    pub fn generic(status: u16, body: impl Into<Bytes>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// HTTP status code of the response
    pub fn status(&self) -> u16 {
        match self {
            Self::RateLimited(limit) => limit.status,
            Self::Status { status, .. } => *status,
        }
    }

    /// Response body exactly as received
    pub fn body_bytes(&self) -> &Bytes {
        match self {
            Self::RateLimited(limit) => &limit.body,
            Self::Status { body, .. } => body,
        }
    }

    /// Response body as text; invalid UTF-8 is replaced
    pub fn body(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.body_bytes())
    }

    /// Coarse label for routing decisions
    pub fn class(&self) -> StatusClass {
        StatusCode::from_u16(self.status())
            .map(classify_status)
            .unwrap_or(StatusClass::Unknown)
    }

    /// Parse the body as JSON, if it is JSON
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(self.body_bytes()).ok()
    }
}

/// Details of a 429 response
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitError {
    /// Always 429
    pub status: u16,
    /// Response body exactly as received
    pub body: Bytes,
    /// When the response was observed
    pub observed_at: DateTime<Utc>,
    /// How long to wait from `observed_at`
    pub retry_after: Duration,
    /// `observed_at + retry_after`
    pub retry_at: DateTime<Utc>,
    /// Which signal produced `retry_after`
    pub source: RetryAfterSource,
}

/// Where a retry hint came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAfterSource {
    /// `Retry-After: <seconds>`
    RetryAfterSeconds,
    /// `Retry-After: <http-date>`
    RetryAfterDate,
    /// `X-RateLimit-Reset: <seconds>`
    RateLimitReset,
    /// `retry_after` field in a JSON body
    Body,
    /// No usable hint
    Default,
}

/// Classification of HTTP statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 401 Unauthorized
    Unauthorized,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 429 Too Many Requests
    RateLimited,
    /// Other 4xx errors
    ClientError,
    /// 5xx errors
    ServerError,
    /// Anything else
    Unknown,
}

/// Classify an HTTP status code
pub fn classify_status(status: StatusCode) -> StatusClass {
    match status {
        StatusCode::UNAUTHORIZED => StatusClass::Unauthorized,
        StatusCode::FORBIDDEN => StatusClass::Forbidden,
        StatusCode::NOT_FOUND => StatusClass::NotFound,
        StatusCode::TOO_MANY_REQUESTS => StatusClass::RateLimited,
        s if s.is_client_error() => StatusClass::ClientError,
        s if s.is_server_error() => StatusClass::ServerError,
        _ => StatusClass::Unknown,
    }
}

/// Classifies failed responses
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    default_retry_after: Duration,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_AFTER)
    }
}

impl Classifier {
    /// Create a classifier with the delay used when a 429 carries no hint
    pub fn new(default_retry_after: Duration) -> Self {
        Self {
            default_retry_after,
        }
    }

    pub fn default_retry_after(&self) -> Duration {
        self.default_retry_after
    }

    /// Classify a non-2xx response observed at `observed_at`
    pub fn classify(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        observed_at: DateTime<Utc>,
    ) -> ApiError {
        let raw = Bytes::copy_from_slice(body);

        if status != StatusCode::TOO_MANY_REQUESTS {
            return ApiError::generic(status.as_u16(), raw);
        }

        let (retry_after, retry_at, source) = self.retry_hint(headers, body, observed_at);

        ApiError::RateLimited(RateLimitError {
            status: status.as_u16(),
            body: raw,
            observed_at,
            retry_after,
            retry_at,
            source,
        })
    }

    fn retry_hint(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        observed_at: DateTime<Utc>,
    ) -> (Duration, DateTime<Utc>, RetryAfterSource) {
        if let Some(value) = header_str(headers, RETRY_AFTER.as_str()) {
            if let Some((delay, at)) = parse_seconds(value).and_then(|d| offset(observed_at, d)) {
                return (delay, at, RetryAfterSource::RetryAfterSeconds);
            }
            if let Some(date) = parse_http_date(value) {
                let at = date.max(observed_at);
                let delay = (at - observed_at).to_std().unwrap_or_default();
                return (delay, at, RetryAfterSource::RetryAfterDate);
            }
        }

        if let Some((delay, at)) = header_str(headers, RATE_LIMIT_RESET)
            .and_then(parse_seconds)
            .and_then(|d| offset(observed_at, d))
        {
            return (delay, at, RetryAfterSource::RateLimitReset);
        }

        if let Some((delay, at)) = body_retry_after(body).and_then(|d| offset(observed_at, d)) {
            return (delay, at, RetryAfterSource::Body);
        }

        let (delay, at) = offset(observed_at, self.default_retry_after)
            .unwrap_or((self.default_retry_after, observed_at));
        (delay, at, RetryAfterSource::Default)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

fn parse_seconds(value: &str) -> Option<Duration> {
    value.parse::<u64>().ok().map(Duration::from_secs)
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn body_retry_after(body: &[u8]) -> Option<Duration> {
    let json: Value = serde_json::from_slice(body).ok()?;
    BODY_RETRY_FIELDS.iter().find_map(|field| match json.get(field)? {
        Value::Number(n) => n.as_u64().map(Duration::from_secs),
        Value::String(s) => parse_seconds(s.trim()),
        _ => None,
    })
}

/// `(delay, observed_at + delay)`, or `None` when the sum overflows
fn offset(observed_at: DateTime<Utc>, delay: Duration) -> Option<(Duration, DateTime<Utc>)> {
    let delta = chrono::Duration::from_std(delay).ok()?;
    observed_at
        .checked_add_signed(delta)
        .map(|at| (delay, at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use reqwest::header::HeaderValue;
    use test_case::test_case;

    fn observed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    fn rate_limit(headers: &HeaderMap, body: &[u8]) -> RateLimitError {
        match Classifier::default().classify(
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            body,
            observed(),
        ) {
            ApiError::RateLimited(limit) => limit,
            other => panic!("Expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_retry_after_seconds() {
        let limit = rate_limit(&headers(&[("retry-after", "17")]), b"");

        assert_eq!(limit.status, 429);
        assert_eq!(limit.retry_after, Duration::from_secs(17));
        assert_eq!(limit.retry_at, observed() + chrono::Duration::seconds(17));
        assert_eq!(limit.observed_at, observed());
        assert_eq!(limit.source, RetryAfterSource::RetryAfterSeconds);
    }

    #[test]
    fn test_retry_after_http_date() {
        let limit = rate_limit(
            &headers(&[("retry-after", "Fri, 01 Mar 2024 12:02:00 GMT")]),
            b"",
        );

        assert_eq!(limit.retry_after, Duration::from_secs(120));
        assert_eq!(limit.retry_at, observed() + chrono::Duration::minutes(2));
        assert_eq!(limit.source, RetryAfterSource::RetryAfterDate);
    }

    #[test]
    fn test_retry_after_date_in_past_means_now() {
        let limit = rate_limit(
            &headers(&[("retry-after", "Fri, 01 Mar 2024 11:00:00 GMT")]),
            b"",
        );

        assert_eq!(limit.retry_after, Duration::ZERO);
        assert_eq!(limit.retry_at, observed());
    }

    #[test]
    fn test_rate_limit_reset_header() {
        let limit = rate_limit(&headers(&[("x-ratelimit-reset", "2")]), b"");

        assert_eq!(limit.retry_after, Duration::from_secs(2));
        assert_eq!(limit.source, RetryAfterSource::RateLimitReset);
    }

    #[test]
    fn test_retry_after_beats_reset_header() {
        let limit = rate_limit(
            &headers(&[("retry-after", "5"), ("x-ratelimit-reset", "9")]),
            b"",
        );

        assert_eq!(limit.retry_after, Duration::from_secs(5));
    }

    #[test_case(br#"{"retry_after": 12}"# ; "snake case number")]
    #[test_case(br#"{"retryAfter": 12}"# ; "camel case number")]
    #[test_case(br#"{"retry_after": "12"}"# ; "string seconds")]
    fn test_body_hint(body: &[u8]) {
        let limit = rate_limit(&HeaderMap::new(), body);

        assert_eq!(limit.retry_after, Duration::from_secs(12));
        assert_eq!(limit.source, RetryAfterSource::Body);
    }

    #[test_case(&[("retry-after", "soon")], b"" ; "garbage header")]
    #[test_case(&[("retry-after", "-5")], b"" ; "negative seconds")]
    #[test_case(&[("x-ratelimit-reset", "1.5")], b"" ; "fractional reset")]
    #[test_case(&[], br#"{"retry_after": -1}"# ; "negative body value")]
    #[test_case(&[], b"<html>slow down</html>" ; "non json body")]
    #[test_case(&[], b"" ; "no hint at all")]
    fn test_malformed_hints_fall_back_to_default(pairs: &[(&'static str, &'static str)], body: &[u8]) {
        let limit = rate_limit(&headers(pairs), body);

        assert_eq!(limit.retry_after, DEFAULT_RETRY_AFTER);
        assert_eq!(limit.retry_at, observed() + chrono::Duration::seconds(60));
        assert_eq!(limit.source, RetryAfterSource::Default);
    }

    #[test]
    fn test_configured_default_delay() {
        let classifier = Classifier::new(Duration::from_secs(5));
        let err = classifier.classify(
            StatusCode::TOO_MANY_REQUESTS,
            &HeaderMap::new(),
            b"",
            observed(),
        );

        match err {
            ApiError::RateLimited(limit) => {
                assert_eq!(limit.retry_after, Duration::from_secs(5));
                assert_eq!(limit.retry_at, observed() + chrono::Duration::seconds(5));
            }
            other => panic!("Expected RateLimited, got {other:?}"),
        }
    }

    #[test_case(400 ; "bad request")]
    #[test_case(404 ; "not found")]
    #[test_case(500 ; "server error")]
    #[test_case(503 ; "unavailable")]
    fn test_generic_status_keeps_raw_body(status: u16) {
        let body = br#"{"success":false,"error":"nope"}"#;
        let err = Classifier::default().classify(
            StatusCode::from_u16(status).unwrap(),
            &headers(&[("retry-after", "10")]),
            body,
            observed(),
        );

        assert_eq!(
            err,
            ApiError::generic(status, r#"{"success":false,"error":"nope"}"#)
        );
        assert_eq!(err.body_json().unwrap()["error"], "nope");
    }

    #[test]
    fn test_status_class() {
        assert_eq!(ApiError::generic(401, "").class(), StatusClass::Unauthorized);
        assert_eq!(ApiError::generic(403, "").class(), StatusClass::Forbidden);
        assert_eq!(ApiError::generic(404, "").class(), StatusClass::NotFound);
        assert_eq!(ApiError::generic(409, "").class(), StatusClass::ClientError);
        assert_eq!(ApiError::generic(502, "").class(), StatusClass::ServerError);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            StatusClass::RateLimited
        );
        assert_eq!(classify_status(StatusCode::OK), StatusClass::Unknown);
    }

    #[test]
    fn test_display() {
        let limit = rate_limit(&headers(&[("retry-after", "3")]), b"");
        assert_eq!(
            ApiError::RateLimited(limit).to_string(),
            "Rate limited (HTTP 429), retry after 3s"
        );
        assert_eq!(ApiError::generic(404, "gone").to_string(), "HTTP 404: gone");
    }

    #[test]
    fn test_non_utf8_body_kept_verbatim() {
        let body: &[u8] = &[0xff, 0xfe, 0x41];

        let err = Classifier::default().classify(
            StatusCode::BAD_GATEWAY,
            &HeaderMap::new(),
            body,
            observed(),
        );
        assert_eq!(err.body_bytes().as_ref(), body);
        assert_eq!(err.body(), "\u{fffd}\u{fffd}A");
        assert_eq!(err.to_string(), "HTTP 502: \u{fffd}\u{fffd}A");

        let limit = rate_limit(&HeaderMap::new(), body);
        assert_eq!(limit.body.as_ref(), body);
    }
}
