//! Retry policy for pooled tasks
//!
//! Classification decides whether a failure is retried; backoff decides how
//! long the tab waits before the next attempt.

pub mod backoff;
pub mod classify;

pub use backoff::{BackoffBounds, BackoffController, BackoffDecision, BackoffState, BackoffStates};
pub use classify::{
    ErrorCategory, NAVIGATION_TIMEOUT_MESSAGE, RateLimitError, TemporaryError,
    WAIT_TIMEOUT_MESSAGE, catch_temporary_error, classify, is_navigation_timeout_error,
    is_rate_limited_error, is_temporary_error, is_wait_timeout_error,
};
