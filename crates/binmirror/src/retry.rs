//! Shared retry utilities.
//!
//! Used for metadata writes that can hit a busy SQLite database and for
//! upstream requests that fail transiently.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::sync::{INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RETRIES, ProgressCallback, SyncProgress};

/// Configuration for retry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts; `0` disables retrying.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    /// A configuration that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Run `operation`, retrying errors accepted by `is_retryable`.
///
/// Each retry is logged at debug level and reported as
/// [`SyncProgress::RetryBackoff`] when a callback is given.
///
/// # Example
///
/// ```ignore
/// let saved = with_retry(
///     || repository::save(db, category, parent, &item),
///     RetryConfig::default(),
///     repository::is_retryable_error,
///     "save /v1.0/",
///     None,
/// )
/// .await?;
/// ```
pub async fn with_retry<T, E, F, Fut, IsRetryable>(
    mut operation: F,
    config: RetryConfig,
    is_retryable: IsRetryable,
    target: &str,
    on_progress: Option<&ProgressCallback>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error,
    IsRetryable: Fn(&E) -> bool,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.into_backoff())
        .notify(|err, dur| {
            let current_attempt = attempt.load(Ordering::SeqCst);
            if let Some(cb) = on_progress {
                cb(SyncProgress::RetryBackoff {
                    target: target.to_string(),
                    retry_after_ms: dur.as_millis() as u64,
                    attempt: current_attempt,
                });
            }
            tracing::debug!(
                target_name = target,
                attempt = current_attempt,
                delay = ?dur,
                error = %err,
                "Transient failure, retrying"
            );
        })
        .when(is_retryable)
        .await
}
