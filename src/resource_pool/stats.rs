//! Per-tab bookkeeping and the read-only diagnostic snapshots built from it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::priority::Priority;
use crate::retry::{BackoffStates, ErrorCategory};

/// Stable identifier the pool assigns to each admitted tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// Condensed view of a task failure for quick triage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// First line of the outermost error message
    pub summary: String,
    /// Where the failure started: the first line of the innermost cause in
    /// the error chain, when it differs from the summary. Stands in for a
    /// stack frame, since task errors carry no captured backtrace by default.
    pub origin: Option<String>,
    /// How the pool treated the failure
    pub category: ErrorCategory,
    /// Task key of the request that failed
    pub context: String,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub(crate) fn new(error: &anyhow::Error, category: ErrorCategory, task_key: &str) -> Self {
        let summary = first_line(&error.to_string());
        let origin = Some(first_line(&error.root_cause().to_string())).filter(|o| *o != summary);
        Self {
            summary,
            origin,
            category,
            context: task_key.to_string(),
            at: Utc::now(),
        }
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}

/// Live statistics for one tab, owned by the scheduler
#[derive(Debug, Clone)]
pub(crate) struct ResourceStats {
    pub(crate) endpoint: String,
    pub(crate) last_checked_out_at: Option<DateTime<Utc>>,
    pub(crate) last_checked_in_at: Option<DateTime<Utc>>,
    pub(crate) last_task_duration: Option<Duration>,
    pub(crate) last_error: Option<ErrorRecord>,
    pub(crate) current_priority: Priority,
    pub(crate) current_task_key: Option<String>,
    pub(crate) tasks_completed: u64,
    pub(crate) backoff: BackoffStates,
}

impl ResourceStats {
    pub(crate) fn new(endpoint: String, backoff: BackoffStates) -> Self {
        Self {
            endpoint,
            last_checked_out_at: None,
            last_checked_in_at: None,
            last_task_duration: None,
            last_error: None,
            current_priority: Priority::Invalid,
            current_task_key: None,
            tasks_completed: 0,
            backoff,
        }
    }

    pub(crate) fn is_free(&self) -> bool {
        self.current_priority == Priority::Invalid
    }

    /// Assignment to a request: stamp it and give the tab fresh backoff clocks
    pub(crate) fn mark_checked_out(&mut self, priority: Priority, task_key: &str) {
        self.last_checked_out_at = Some(Utc::now());
        self.current_priority = priority;
        self.current_task_key = Some(task_key.to_string());
        self.backoff.reset_all();
    }

    /// Return from a task; `completed` is false when the caller went away mid-task
    pub(crate) fn mark_checked_in(&mut self, duration: Duration, completed: bool) {
        self.last_checked_in_at = Some(Utc::now());
        self.last_task_duration = Some(duration);
        if completed {
            self.tasks_completed += 1;
        }
        self.mark_free();
    }

    pub(crate) fn mark_free(&mut self) {
        self.current_priority = Priority::Invalid;
        self.current_task_key = None;
    }

    pub(crate) fn snapshot(&self, id: ResourceId) -> ResourceDiagnostics {
        ResourceDiagnostics {
            id,
            endpoint: self.endpoint.clone(),
            free: self.is_free(),
            current_priority: self.current_priority,
            current_task_key: self.current_task_key.clone(),
            last_checked_out_at: self.last_checked_out_at,
            last_checked_in_at: self.last_checked_in_at,
            last_task_duration_ms: self.last_task_duration.map(|d| d.as_millis() as u64),
            tasks_completed: self.tasks_completed,
            last_error: self.last_error.clone(),
            backoff: self
                .backoff
                .iter()
                .map(|(category, state)| {
                    (
                        category,
                        BackoffSnapshot {
                            consecutive_failures: state.consecutive_failures(),
                            next_delay_ms: state.next_delay().as_millis() as u64,
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Backoff depth and pending delay for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSnapshot {
    pub consecutive_failures: u32,
    pub next_delay_ms: u64,
}

/// Point-in-time view of one tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiagnostics {
    pub id: ResourceId,
    pub endpoint: String,
    pub free: bool,
    pub current_priority: Priority,
    pub current_task_key: Option<String>,
    pub last_checked_out_at: Option<DateTime<Utc>>,
    pub last_checked_in_at: Option<DateTime<Utc>>,
    pub last_task_duration_ms: Option<u64>,
    pub tasks_completed: u64,
    pub last_error: Option<ErrorRecord>,
    pub backoff: BTreeMap<ErrorCategory, BackoffSnapshot>,
}

/// Everything a status endpoint reports about the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub live_resources: usize,
    pub free_resources: usize,
    pub in_use_resources: usize,
    /// Pending requests per level; a number that keeps rising means waiters are leaking
    pub queue_depths: BTreeMap<Priority, usize>,
    pub connections: Vec<String>,
    pub resources: Vec<ResourceDiagnostics>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffController;
    use anyhow::Context;

    #[test]
    fn test_error_record_keeps_first_line_and_origin() {
        let err = Err::<(), _>(std::io::Error::other("connection reset\nby peer"))
            .context("Failed to load profile 274047")
            .expect_err("should fail");
        let record = ErrorRecord::new(&err, ErrorCategory::Fatal, "https://example.com/p/274047");

        assert_eq!(record.summary, "Failed to load profile 274047");
        assert_eq!(record.origin.as_deref(), Some("connection reset"));
        assert_eq!(record.context, "https://example.com/p/274047");
    }

    #[test]
    fn test_checkout_resets_backoff_and_checkin_frees() {
        let controller = BackoffController::default();
        let mut stats = ResourceStats::new("local".into(), controller.fresh_states());
        assert!(stats.is_free());

        stats.mark_checked_out(Priority::High, "match/1");
        controller.on_failure(&mut stats.backoff, ErrorCategory::Temporary);
        assert_eq!(
            stats.backoff.get(ErrorCategory::Temporary).map(|s| s.consecutive_failures()),
            Some(1)
        );
        assert!(!stats.is_free());

        stats.mark_checked_in(Duration::from_millis(40), true);
        assert!(stats.is_free());
        assert_eq!(stats.tasks_completed, 1);

        stats.mark_checked_out(Priority::Low, "match/2");
        assert_eq!(
            stats.backoff.get(ErrorCategory::Temporary).map(|s| s.consecutive_failures()),
            Some(0)
        );

        let snapshot = stats.snapshot(ResourceId(3));
        assert_eq!(snapshot.current_priority, Priority::Low);
        assert_eq!(snapshot.current_task_key.as_deref(), Some("match/2"));
        assert_eq!(snapshot.last_task_duration_ms, Some(40));
        assert_eq!(snapshot.backoff.len(), 2);
    }
}
