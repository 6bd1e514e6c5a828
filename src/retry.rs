//! Opt-in retries
//!
//! `HttpClient` performs exactly one round trip per call. Callers that want
//! retries wrap their calls in `with_retry`:
//!
//! ```no_run
//! # use crm_sdk_core::{retry, CallContext, HttpClient, Result};
//! # async fn run(client: HttpClient) -> Result<()> {
//! let ctx = CallContext::new();
//! let policy = retry::RetryPolicy::default();
//! let deal: serde_json::Value =
//!     retry::with_retry(&ctx, &policy, || client.get(&ctx, "deals/42")).await?;
//! # Ok(())
//! # }
//! ```

use crate::context::CallContext;
use crate::error::Result;
use crate::types::BackoffType;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how long to retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Type of backoff strategy
    #[serde(default)]
    pub backoff_type: BackoffType,
    /// Initial delay for backoff
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    #[serde(with = "millis")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_type: BackoffType::Exponential,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the maximum number of retries
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set backoff strategy and bounds
    #[must_use]
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.backoff_type = backoff_type;
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Calculate backoff delay for a given attempt (0-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            BackoffType::Constant => self.initial_backoff,
            BackoffType::Linear => self.initial_backoff.saturating_mul(attempt.saturating_add(1)),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.initial_backoff.saturating_mul(factor)
            }
        };

        std::cmp::min(delay, self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs
/// out of retries.
///
/// Rate-limited failures wait the server's `retry_after`; other retryable
/// failures wait the policy's backoff. Waiting ends early with
/// `Error::Cancelled`/`Error::DeadlineExceeded` when `ctx` is done.
pub async fn with_retry<T, F, Fut>(ctx: &CallContext, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retryable() || attempt >= policy.max_retries {
            if attempt > 0 {
                debug!("Giving up after {} attempts: {}", attempt + 1, err);
            }
            return Err(err);
        }

        let delay = err
            .retry_after()
            .unwrap_or_else(|| policy.backoff_delay(attempt));
        warn!(
            "Attempt {}/{} failed: {}, retrying in {:?}",
            attempt + 1,
            policy.max_retries + 1,
            err,
            delay
        );

        ctx.sleep(delay).await?;
        attempt += 1;
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
