//! Error types for resource pool operations

use std::time::Duration;

use super::priority::Priority;
use crate::retry::ErrorCategory;

/// Errors returned by [`ResourcePool`](super::ResourcePool) operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool was shut down before or while the request waited
    #[error("resource pool shut down")]
    PoolShutDown,

    /// `shutdown()` was called a second time
    #[error("resource pool already shut down")]
    AlreadyShutDown,

    /// A remote browser did not answer within its connection budget
    #[error("timed out after {timeout:?} while connecting to {address}")]
    ConnectTimeout { address: String, timeout: Duration },

    /// Requests must name a real priority level
    #[error("cannot queue a request at priority {0}")]
    InvalidPriority(Priority),

    /// Launching, connecting or initializing a backing connection failed
    #[error("backing connection failed")]
    Connection(#[source] anyhow::Error),

    /// The task failed with an error the pool does not retry
    #[error(transparent)]
    Task(anyhow::Error),

    /// A retryable failure kept recurring past its configured ceiling
    #[error("{category} failure persisted after {attempts} attempts")]
    RetriesExhausted {
        category: ErrorCategory,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl PoolError {
    /// The task's own error, when the failure came from the task body
    #[must_use]
    pub fn task_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Task(e) | Self::RetriesExhausted { source: e, .. } => Some(e),
            _ => None,
        }
    }

    /// True for the signals raised once the pool is gone
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        matches!(self, Self::PoolShutDown | Self::AlreadyShutDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn failure() -> anyhow::Error {
        anyhow!("connection reset").context("Failed to load match 9121")
    }

    #[test]
    fn test_chain_is_printed_once() {
        let task = anyhow::Error::new(PoolError::Task(failure()));
        assert_eq!(format!("{task:#}"), "Failed to load match 9121: connection reset");

        let exhausted = anyhow::Error::new(PoolError::RetriesExhausted {
            category: ErrorCategory::Temporary,
            attempts: 3,
            source: failure(),
        });
        assert_eq!(
            format!("{exhausted:#}"),
            "temporary failure persisted after 3 attempts: Failed to load match 9121: connection reset"
        );

        let connection = anyhow::Error::new(PoolError::Connection(failure()));
        assert_eq!(
            format!("{connection:#}"),
            "backing connection failed: Failed to load match 9121: connection reset"
        );
    }

    #[test]
    fn test_task_error_is_reachable() {
        let err = PoolError::Task(failure());
        assert_eq!(err.to_string(), "Failed to load match 9121");
        assert_eq!(
            err.task_error().map(|e| e.root_cause().to_string()).as_deref(),
            Some("connection reset")
        );
        assert!(PoolError::Connection(failure()).task_error().is_none());
    }
}
