//! Per-call context
//!
//! A `CallContext` carries cancellation, an optional deadline and arbitrary
//! per-call metadata through one request (or one pagination traversal).
//! Cloning is cheap; clones share the cancellation token.

use crate::error::{Error, Result};
use crate::types::JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation, deadline and metadata for a single call
#[derive(Debug, Clone)]
pub struct CallContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
    values: Arc<HashMap<String, JsonValue>>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// A context that is never cancelled and has no deadline
    pub fn new() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            deadline: None,
            values: Arc::new(HashMap::new()),
        }
    }

    /// Use an existing cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Derive a context whose cancellation does not propagate to the parent
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancellation: self.cancellation.child_token(),
            deadline: self.deadline,
            values: Arc::clone(&self.values),
        }
    }

    /// Tighten the deadline to `now + timeout`
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tighten the deadline. An earlier existing deadline is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Attach a metadata value, replacing any previous value for `key`
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Arc::make_mut(&mut self.values).insert(key.into(), value.into());
        self
    }

    /// Get a metadata value
    pub fn value(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    /// The cancellation token shared by this context and its clones
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// The effective deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check if the context was cancelled or its deadline passed
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Fail fast if the context is already done
    pub fn check(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context is cancelled or expires first
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Error::Cancelled),
            () = deadline => Err(Error::DeadlineExceeded),
            result = fut => result,
        }
    }

    /// Sleep for `duration`, waking early with an error on cancellation
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
