//! Per-call request options
//!
//! A `RequestOption` captures one desired mutation of a call: a header, a
//! context value, a timeout. Options are applied in order, so a later option
//! overrides an earlier one for the same header or key. Applying a list of
//! options yields two things: the augmented `CallContext` (needed before the
//! request is built) and a list of `RequestEditor`s that run against the
//! built request right before it is sent.

use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::types::JsonValue;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Request;
use std::sync::Arc;
use std::time::Duration;

/// Mutation applied to a built request just before it is sent
pub type RequestEditor = Arc<dyn Fn(&mut Request) -> Result<()> + Send + Sync>;

/// Snapshot that request options mutate
pub struct CallOptions {
    /// Context the call will run under
    pub context: CallContext,
    /// Editors, in application order
    pub editors: Vec<RequestEditor>,
}

impl CallOptions {
    /// Start from a context with no editors
    pub fn new(context: CallContext) -> Self {
        Self {
            context,
            editors: Vec::new(),
        }
    }

    /// Replace the context with a derived one
    pub fn map_context(&mut self, f: impl FnOnce(CallContext) -> CallContext) {
        let context = std::mem::take(&mut self.context);
        self.context = f(context);
    }

    /// Queue an editor after the ones already queued
    pub fn push_editor(&mut self, editor: RequestEditor) {
        self.editors.push(editor);
    }
}

/// A single configuration step for one outgoing call
#[derive(Clone)]
pub struct RequestOption(Arc<dyn Fn(&mut CallOptions) + Send + Sync>);

impl RequestOption {
    /// Build an option from an arbitrary snapshot mutation
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut CallOptions) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Run an arbitrary mutation on the built request
    pub fn editor<F>(f: F) -> Self
    where
        F: Fn(&mut Request) -> Result<()> + Send + Sync + 'static,
    {
        let editor: RequestEditor = Arc::new(f);
        Self::new(move |opts| opts.push_editor(Arc::clone(&editor)))
    }

    /// Set a header, replacing any previous value
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        let editor = set_header(name, value, false);
        Self::new(move |opts| opts.push_editor(Arc::clone(&editor)))
    }

    /// Set a header whose value must not show up in debug output
    pub fn sensitive_header(name: impl Into<String>, value: impl Into<String>) -> Self {
        let editor = set_header(name, value, true);
        Self::new(move |opts| opts.push_editor(Arc::clone(&editor)))
    }

    /// Authenticate this call with a bearer token
    pub fn bearer_token(token: impl AsRef<str>) -> Self {
        Self::sensitive_header(AUTHORIZATION.as_str(), format!("Bearer {}", token.as_ref()))
    }

    /// Set a query parameter on the built request, replacing existing values
    pub fn query(key: impl Into<String>, value: impl Into<String>) -> Self {
        let editor = set_query(key, value);
        Self::new(move |opts| opts.push_editor(Arc::clone(&editor)))
    }

    /// Attach a value to the call context
    pub fn context_value(key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        let key = key.into();
        let value = value.into();
        Self::new(move |opts| {
            let (key, value) = (key.clone(), value.clone());
            opts.map_context(|ctx| ctx.with_value(key, value));
        })
    }

    /// Bound this call by `timeout` (only ever tightens the deadline)
    pub fn timeout(timeout: Duration) -> Self {
        Self::new(move |opts| opts.map_context(|ctx| ctx.with_timeout(timeout)))
    }

    /// Apply this option to a snapshot
    pub fn apply(&self, opts: &mut CallOptions) {
        (self.0)(opts);
    }
}

impl std::fmt::Debug for RequestOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOption").finish_non_exhaustive()
    }
}

/// Run `options` in order against `context`.
///
/// `None` entries are skipped.
pub fn apply_options<I, O>(context: CallContext, options: I) -> (CallContext, Vec<RequestEditor>)
where
    I: IntoIterator<Item = O>,
    O: Into<Option<RequestOption>>,
{
    let mut opts = CallOptions::new(context);
    for option in options.into_iter().filter_map(Into::into) {
        option.apply(&mut opts);
    }
    (opts.context, opts.editors)
}

/// Run editors against a built request, stopping at the first failure
pub fn run_editors(request: &mut Request, editors: &[RequestEditor]) -> Result<()> {
    for editor in editors {
        editor(request)?;
    }
    Ok(())
}

// ============================================================================
// Editor constructors
// ============================================================================

/// Editor that inserts a header, replacing previous values
pub(crate) fn set_header(
    name: impl Into<String>,
    value: impl Into<String>,
    sensitive: bool,
) -> RequestEditor {
    let name = name.into();
    let value = value.into();
    Arc::new(move |req: &mut Request| {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::invalid_header(&name, e))?;
        let mut header_value =
            HeaderValue::from_str(&value).map_err(|e| Error::invalid_header(&name, e))?;
        header_value.set_sensitive(sensitive);
        req.headers_mut().insert(header_name, header_value);
        Ok(())
    })
}

/// Editor that sets a query parameter, replacing previous values
pub(crate) fn set_query(key: impl Into<String>, value: impl Into<String>) -> RequestEditor {
    let key = key.into();
    let value = value.into();
    Arc::new(move |req: &mut Request| {
        let url = req.url_mut();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != key.as_str())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter())
            .append_pair(&key, &value);
        Ok(())
    })
}
