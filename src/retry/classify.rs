//! Failure classification for pooled tasks
//!
//! Task bodies tag recoverable conditions with [`RateLimitError`] or
//! [`TemporaryError`]. The resource pool retries those on the same tab with
//! growing delays and hands everything else back to the caller unchanged.
//!
//! Browser timeouts do not need to be wrapped: navigation timeouts and
//! generic wait timeouts are recognized by their message or error type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tracing::warn;

/// Marker carried by navigation timeout errors
pub const NAVIGATION_TIMEOUT_MESSAGE: &str = "Navigation Timeout Exceeded";

/// Marker carried by wait-for-condition timeout errors
pub const WAIT_TIMEOUT_MESSAGE: &str = "waiting failed: timeout";

/// How the pool reacts to a task failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Upstream is throttling; wait long and retry
    RateLimited,
    /// Network or render flakiness; wait briefly and retry
    Temporary,
    /// Anything unrecognized; never retried
    Fatal,
}

impl ErrorCategory {
    /// Whether the pool retries failures of this category
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Fatal)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Temporary => "temporary",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The upstream site is sending rate-limit responses.
///
/// Raise this (for example on HTTP 429, or when the site serves a non-HTML
/// throttling page) to get exponentially increasing waits between retries.
#[derive(Debug, Clone, thiserror::Error)]
#[error("rate limited: {message}")]
pub struct RateLimitError {
    message: String,
}

impl RateLimitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The upstream site or the browser hit a transient failure.
///
/// Raise this on HTTP 5xx responses or partial renders.
#[derive(Debug, Clone, thiserror::Error)]
#[error("temporary failure: {message}")]
pub struct TemporaryError {
    message: String,
}

impl TemporaryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// True if any layer of the error is a navigation timeout
#[must_use]
pub fn is_navigation_timeout_error(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.to_string().contains(NAVIGATION_TIMEOUT_MESSAGE))
}

/// True if any layer of the error is a wait timeout.
///
/// Covers the wait-timeout message, elapsed `tokio::time::timeout` calls and
/// CDP requests that timed out.
#[must_use]
pub fn is_wait_timeout_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<tokio::time::error::Elapsed>()
            || matches!(
                cause.downcast_ref::<chromiumoxide::error::CdpError>(),
                Some(chromiumoxide::error::CdpError::Timeout)
            )
            || cause.to_string().contains(WAIT_TIMEOUT_MESSAGE)
    })
}

/// True if the error was tagged as a rate-limit condition
#[must_use]
pub fn is_rate_limited_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<RateLimitError>())
}

/// True if the error was tagged temporary or is a recognized timeout
#[must_use]
pub fn is_temporary_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<TemporaryError>())
        || is_navigation_timeout_error(error)
        || is_wait_timeout_error(error)
}

/// Map a task failure onto the category that decides its retry treatment.
///
/// Rate limiting wins over temporary when an error carries both tags.
#[must_use]
pub fn classify(error: &anyhow::Error) -> ErrorCategory {
    if is_rate_limited_error(error) {
        ErrorCategory::RateLimited
    } else if is_temporary_error(error) {
        ErrorCategory::Temporary
    } else {
        ErrorCategory::Fatal
    }
}

/// Mask temporary failures of `operation`.
///
/// Use when a partial answer after a timeout beats both retrying and having
/// no answer at all. Temporary failures are logged and become `Ok(None)`;
/// everything else passes through.
pub async fn catch_temporary_error<T, F>(operation: F) -> anyhow::Result<Option<T>>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match operation.await {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_temporary_error(&e) => {
            warn!("Masked temporary failure: {e:#}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};
    use std::time::Duration;

    #[test]
    fn test_tagged_errors_are_classified() {
        let rate_limited = anyhow::Error::new(RateLimitError::new("HTTP 429"));
        assert_eq!(classify(&rate_limited), ErrorCategory::RateLimited);

        let temporary = anyhow::Error::new(TemporaryError::new("HTTP 503"));
        assert_eq!(classify(&temporary), ErrorCategory::Temporary);
    }

    #[test]
    fn test_tags_survive_context() {
        let err = Err::<(), _>(RateLimitError::new("throttled"))
            .context("Failed to load match summary")
            .expect_err("should be an error");
        assert_eq!(classify(&err), ErrorCategory::RateLimited);
    }

    #[test]
    fn test_timeout_messages_are_temporary() {
        let nav = anyhow!("{NAVIGATION_TIMEOUT_MESSAGE}: 30000 ms exceeded");
        assert!(is_navigation_timeout_error(&nav));
        assert_eq!(classify(&nav), ErrorCategory::Temporary);

        let wait = anyhow!("{WAIT_TIMEOUT_MESSAGE} for selector .match-table");
        assert!(is_wait_timeout_error(&wait));
        assert_eq!(classify(&wait), ErrorCategory::Temporary);
    }

    #[test]
    fn test_unrecognized_errors_are_fatal() {
        let err = anyhow!("Cannot read property 'innerText' of null");
        assert_eq!(classify(&err), ErrorCategory::Fatal);
        assert!(!ErrorCategory::Fatal.is_retryable());
        assert!(ErrorCategory::RateLimited.is_retryable());
    }

    #[tokio::test]
    async fn test_elapsed_timeout_is_temporary() {
        let elapsed = tokio::time::timeout(Duration::from_millis(1), std::future::pending::<()>())
            .await
            .expect_err("pending future should time out");
        let err = anyhow::Error::new(elapsed);
        assert_eq!(classify(&err), ErrorCategory::Temporary);
    }

    #[tokio::test]
    async fn test_catch_temporary_error() {
        let masked = catch_temporary_error(async {
            Err::<u32, _>(anyhow::Error::new(TemporaryError::new("partial render")))
        })
        .await
        .expect("temporary failures are masked");
        assert_eq!(masked, None);

        let passed = catch_temporary_error(async { Ok::<_, anyhow::Error>(7) })
            .await
            .expect("success passes through");
        assert_eq!(passed, Some(7));

        let fatal = catch_temporary_error(async { Err::<u32, _>(anyhow!("bad selector")) }).await;
        assert!(fatal.is_err());
    }
}
