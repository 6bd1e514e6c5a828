//! Raw request executor
//!
//! `HttpClient` performs exactly one HTTP round trip per call:
//! - Resolves the URL and merges query parameters
//! - Encodes the body
//! - Applies credentials, then per-call request options
//! - Sends under the call context's cancellation and deadline
//! - Reads the bounded body, classifies non-2xx responses, decodes JSON
//!
//! It never retries. Retry policy lives above it (see `crate::retry`).

use super::classify::Classifier;
use super::options::{apply_options, run_editors, RequestEditor, RequestOption};
use super::rate_limit::RateLimiter;
use super::request::{is_absolute, resolve_url, ApiRequest, Query, RequestBody};
use super::transport::build_client;
use crate::config::ClientConfig;
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::pagination::{CursorPager, ListResponse, Page};
use crate::types::Cursor;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Request, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Query parameter list endpoints read the cursor from
pub const CURSOR_PARAM: &str = "cursor";

/// Raw client shared by every resource service
///
/// Cloning is cheap; clones share the network client.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    config: ClientConfig,
    base_url: Url,
    default_headers: HeaderMap,
    /// Configured default query with a query-placed API token folded in
    /// at the lowest precedence
    default_query: Query,
    classifier: Classifier,
    auth: Option<RequestEditor>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a client from `config`
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;

        let client = build_client(&config)?;
        let default_headers = header_map(&config)?;
        let classifier = Classifier::new(config.default_retry_after);
        let (default_query, auth) = match config.auth.query_param() {
            Some((name, value)) => (
                Query::new()
                    .append(name, value)
                    .merge(&config.default_query),
                None,
            ),
            None => (config.default_query.clone(), config.auth.editor()),
        };
        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                base_url,
                default_headers,
                default_query,
                classifier,
                auth,
                rate_limiter,
            }),
        })
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.inner.client
    }

    /// Check if client-side pacing is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.inner.rate_limiter.is_some()
    }

    /// Execute `request` and decode the JSON response into `T`.
    ///
    /// An empty success body decodes as JSON `null`, so `()` and `Option<_>`
    /// work for endpoints that answer 204.
    pub async fn call<T: DeserializeOwned>(&self, ctx: &CallContext, request: ApiRequest) -> Result<T> {
        let body = self.call_bytes(ctx, request).await?;
        decode_json(&body)
    }

    /// Execute `request` and return the raw response body
    pub async fn call_bytes(&self, ctx: &CallContext, request: ApiRequest) -> Result<Bytes> {
        let ApiRequest {
            method,
            path,
            query,
            body,
            options,
        } = request;

        let (ctx, editors) = apply_options(ctx.clone(), options);
        let trusted = !is_absolute(&path)
            || Url::parse(&path)?.origin() == self.inner.base_url.origin();
        let defaults = if trusted {
            &self.inner.default_query
        } else {
            debug!("Not sending configured credentials to {}", path);
            &self.inner.config.default_query
        };
        let url = resolve_url(&self.inner.config.base_url, &path, defaults, &query)?;

        let builder = self
            .inner
            .client
            .request(method.into(), url)
            .headers(self.inner.default_headers.clone());
        let mut request = encode_body(builder, body)?.build()?;

        if let Some(auth) = self.inner.auth.as_ref().filter(|_| trusted) {
            auth(&mut request)?;
        }
        run_editors(&mut request, &editors)?;

        ctx.run(self.execute(request)).await
    }

    /// Execute `request`, writing the decoded response into `out` on success.
    ///
    /// `out` is left untouched when any step fails.
    pub async fn call_into<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        request: ApiRequest,
        out: &mut T,
    ) -> Result<()> {
        *out = self.call(ctx, request).await?;
        Ok(())
    }

    /// GET `path` and decode the response
    pub async fn get<T: DeserializeOwned>(&self, ctx: &CallContext, path: &str) -> Result<T> {
        self.call(ctx, ApiRequest::get(path)).await
    }

    /// POST `body` as JSON to `path` and decode the response
    pub async fn post<T, B>(&self, ctx: &CallContext, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(ctx, ApiRequest::post(path).json(body)?).await
    }

    /// PUT `body` as JSON to `path` and decode the response
    pub async fn put<T, B>(&self, ctx: &CallContext, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(ctx, ApiRequest::put(path).json(body)?).await
    }

    /// PATCH `body` as JSON to `path` and decode the response
    pub async fn patch<T, B>(&self, ctx: &CallContext, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(ctx, ApiRequest::patch(path).json(body)?).await
    }

    /// DELETE `path` and decode the response
    pub async fn delete<T: DeserializeOwned>(&self, ctx: &CallContext, path: &str) -> Result<T> {
        self.call(ctx, ApiRequest::delete(path)).await
    }

    /// Walk a cursor-paginated list endpoint.
    ///
    /// Each page is a GET of `path` with `query`, `options`, and the current
    /// cursor in the `cursor` parameter. The response is read as a
    /// `ListResponse<T>` envelope.
    pub fn paginate<T>(
        &self,
        ctx: &CallContext,
        path: impl Into<String>,
        query: Query,
        options: Vec<RequestOption>,
    ) -> CursorPager<T, impl FnMut(CallContext, Cursor) -> BoxFuture<'static, Result<Page<T>>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let path = path.into();

        CursorPager::new(ctx.clone(), move |ctx: CallContext, cursor: Cursor| {
            let client = client.clone();
            let mut request = ApiRequest::get(path.clone())
                .with_query(query.clone())
                .with_options(options.clone());
            if let Some(cursor) = cursor {
                request = request.query_set(CURSOR_PARAM, cursor);
            }

            async move {
                let list: ListResponse<T> = client.call(&ctx, request).await?;
                Ok::<_, Error>(Page::from(list))
            }
            .boxed()
        })
    }

    async fn execute(&self, request: Request) -> Result<Bytes> {
        if let Some(limiter) = &self.inner.rate_limiter {
            limiter.wait().await;
        }

        let method = request.method().clone();
        let path = request.url().path().to_string();
        debug!("Sending {} {}", method, path);

        let response = self.inner.client.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = read_body(response, self.inner.config.max_response_bytes).await?;

        if !status.is_success() {
            let error = self
                .inner
                .classifier
                .classify(status, &headers, &body, Utc::now());
            if error.status() == 429 {
                warn!("Rate limited on {} {}: {}", method, path, error);
            } else {
                debug!("Request failed: {} {} -> {}", method, path, status.as_u16());
            }
            return Err(error.into());
        }

        debug!(
            "Request succeeded: {} {} ({} bytes)",
            method,
            path,
            body.len()
        );
        Ok(body)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.inner.config)
            .field("has_auth", &self.inner.auth.is_some())
            .field("has_rate_limiter", &self.inner.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    if base_url.trim().is_empty() {
        return Err(Error::config("base_url must not be empty"));
    }
    let url = Url::parse(base_url)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::config(format!(
            "base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }
    Ok(url)
}

/// Validate configured default headers once, at construction
fn header_map(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(config.default_headers.len());
    for (name, value) in &config.default_headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::invalid_header(name, e))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| Error::invalid_header(name, e))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

fn encode_body(
    builder: reqwest::RequestBuilder,
    body: RequestBody,
) -> Result<reqwest::RequestBuilder> {
    let builder = match body {
        RequestBody::Empty => builder,
        RequestBody::Json(value) => {
            let bytes = serde_json::to_vec(&value).map_err(|e| Error::encode(e.to_string()))?;
            builder
                .header(CONTENT_TYPE, "application/json")
                .body(bytes)
        }
        RequestBody::Form(form) => {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(form.iter())
                .finish();
            builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(encoded)
        }
        RequestBody::Raw {
            bytes,
            content_type,
        } => builder.header(CONTENT_TYPE, content_type).body(bytes),
        RequestBody::Multipart(form) => builder.multipart(form),
    };
    Ok(builder)
}

/// Read the whole body, refusing anything over `limit` bytes
async fn read_body(mut response: Response, limit: usize) -> Result<Bytes> {
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(Error::ResponseTooLarge { limit });
    }

    let mut buffer = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        if buffer.len() + chunk.len() > limit {
            return Err(Error::ResponseTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let body: &[u8] = if body.iter().all(|b| b.is_ascii_whitespace()) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| Error::decode(e.to_string()))
}
