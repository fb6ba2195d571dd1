//! Per-tab exponential backoff
//!
//! Every pooled tab carries one [`BackoffState`] per retryable
//! [`ErrorCategory`]. A failure advances the matching state (the caller sleeps
//! for the returned delay and the next delay doubles up to the cap); a
//! checkout resets both states so a reassigned tab starts fresh.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::classify::ErrorCategory;
use crate::utils::constants::{
    DEFAULT_RATE_LIMIT_MAX_DELAY_MS, DEFAULT_RATE_LIMIT_MIN_DELAY_MS,
    DEFAULT_TEMPORARY_MAX_DELAY_MS, DEFAULT_TEMPORARY_MIN_DELAY_MS,
};

/// Delay bounds for one failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffBounds {
    /// First delay after a failure, in milliseconds
    pub min_delay_ms: u64,
    /// Cap on the delay, in milliseconds
    pub max_delay_ms: u64,
    /// Consecutive retries allowed before the failure escalates.
    /// `None` retries for as long as the tab is held.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl BackoffBounds {
    #[must_use]
    pub const fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay_ms: min_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
            max_retries: None,
        }
    }

    /// Default bounds for rate limiting: 10 minutes doubling up to 1 hour
    #[must_use]
    pub const fn rate_limited() -> Self {
        Self {
            min_delay_ms: DEFAULT_RATE_LIMIT_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_RATE_LIMIT_MAX_DELAY_MS,
            max_retries: None,
        }
    }

    /// Default bounds for transient failures: 5 seconds doubling up to 5 minutes
    #[must_use]
    pub const fn temporary() -> Self {
        Self {
            min_delay_ms: DEFAULT_TEMPORARY_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_TEMPORARY_MAX_DELAY_MS,
            max_retries: None,
        }
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub const fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

const MIN_BACKOFF_DELAY: Duration = Duration::from_millis(1);

/// Backoff progress for one category on one tab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    consecutive_failures: u32,
    next_delay: Duration,
    min_delay: Duration,
    max_delay: Duration,
}

impl BackoffState {
    #[must_use]
    pub fn new(bounds: &BackoffBounds) -> Self {
        // A zero delay would double to zero and spin the retry loop
        let max_delay = bounds.max_delay().max(MIN_BACKOFF_DELAY);
        let min_delay = bounds.min_delay().clamp(MIN_BACKOFF_DELAY, max_delay);
        Self {
            consecutive_failures: 0,
            next_delay: min_delay,
            min_delay,
            max_delay,
        }
    }

    /// Back to zero failures and the minimum delay
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.next_delay = self.min_delay;
    }

    /// Count one more failure and return how long the caller should sleep.
    ///
    /// The delay after this one doubles, capped at the maximum.
    pub fn advance(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let delay = self.next_delay;
        self.next_delay = self.next_delay.saturating_mul(2).min(self.max_delay);
        delay
    }

    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub const fn next_delay(&self) -> Duration {
        self.next_delay
    }

    #[must_use]
    pub const fn min_delay(&self) -> Duration {
        self.min_delay
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

/// The pair of backoff states a tab carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStates {
    rate_limited: BackoffState,
    temporary: BackoffState,
}

impl BackoffStates {
    /// State for a retryable category; `None` for [`ErrorCategory::Fatal`]
    #[must_use]
    pub fn get(&self, category: ErrorCategory) -> Option<&BackoffState> {
        match category {
            ErrorCategory::RateLimited => Some(&self.rate_limited),
            ErrorCategory::Temporary => Some(&self.temporary),
            ErrorCategory::Fatal => None,
        }
    }

    pub fn get_mut(&mut self, category: ErrorCategory) -> Option<&mut BackoffState> {
        match category {
            ErrorCategory::RateLimited => Some(&mut self.rate_limited),
            ErrorCategory::Temporary => Some(&mut self.temporary),
            ErrorCategory::Fatal => None,
        }
    }

    pub fn reset_all(&mut self) {
        self.rate_limited.reset();
        self.temporary.reset();
    }

    /// `(category, state)` pairs in a stable order
    pub fn iter(&self) -> impl Iterator<Item = (ErrorCategory, &BackoffState)> {
        [
            (ErrorCategory::RateLimited, &self.rate_limited),
            (ErrorCategory::Temporary, &self.temporary),
        ]
        .into_iter()
    }
}

/// What the retry loop should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Sleep for the delay, then run the task again
    RetryAfter(Duration),
    /// The category's retry ceiling was exceeded after this many attempts
    Exhausted { attempts: u32 },
    /// Fatal failures are never retried
    GiveUp,
}

/// Builds fresh per-tab states and advances them on failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffController {
    rate_limited: BackoffBounds,
    temporary: BackoffBounds,
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new(BackoffBounds::rate_limited(), BackoffBounds::temporary())
    }
}

impl BackoffController {
    #[must_use]
    pub const fn new(rate_limited: BackoffBounds, temporary: BackoffBounds) -> Self {
        Self {
            rate_limited,
            temporary,
        }
    }

    #[must_use]
    pub fn bounds(&self, category: ErrorCategory) -> Option<&BackoffBounds> {
        match category {
            ErrorCategory::RateLimited => Some(&self.rate_limited),
            ErrorCategory::Temporary => Some(&self.temporary),
            ErrorCategory::Fatal => None,
        }
    }

    /// States for a tab that has never failed
    #[must_use]
    pub fn fresh_states(&self) -> BackoffStates {
        BackoffStates {
            rate_limited: BackoffState::new(&self.rate_limited),
            temporary: BackoffState::new(&self.temporary),
        }
    }

    /// Advance the category's state and decide how to continue.
    ///
    /// Does not sleep, so it can run while the pool's bookkeeping is locked.
    pub fn on_failure(&self, states: &mut BackoffStates, category: ErrorCategory) -> BackoffDecision {
        let (Some(bounds), Some(state)) = (self.bounds(category), states.get_mut(category)) else {
            return BackoffDecision::GiveUp;
        };

        let delay = state.advance();
        match bounds.max_retries {
            Some(max_retries) if state.consecutive_failures() > max_retries => {
                BackoffDecision::Exhausted {
                    attempts: state.consecutive_failures(),
                }
            }
            _ => BackoffDecision::RetryAfter(delay),
        }
    }

    /// Advance a standalone state and sleep for the resulting delay.
    ///
    /// Suspends only the calling task.
    pub async fn backoff(state: &mut BackoffState) {
        let delay = state.advance();
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(min_ms: u64, max_ms: u64) -> BackoffBounds {
        BackoffBounds::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    #[test]
    fn test_delays_double_and_cap() {
        let mut state = BackoffState::new(&bounds(100, 1_000));

        let delays: Vec<u64> = (0..6).map(|_| state.advance().as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
        assert_eq!(state.consecutive_failures(), 6);
        assert_eq!(state.next_delay(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_next_delay_is_monotonic_and_bounded() {
        let mut state = BackoffState::new(&bounds(30, 500));
        let mut previous = state.next_delay();
        for _ in 0..20 {
            state.advance();
            assert!(state.next_delay() >= previous);
            assert!(state.next_delay() <= state.max_delay());
            previous = state.next_delay();
        }
    }

    #[test]
    fn test_reset_returns_to_minimum() {
        let mut state = BackoffState::new(&bounds(100, 1_000));
        state.advance();
        state.advance();
        state.reset();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_min_above_max_is_clamped() {
        let state = BackoffState::new(&bounds(5_000, 1_000));
        assert_eq!(state.next_delay(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_zero_bounds_still_back_off() {
        let mut state = BackoffState::new(&bounds(0, 0));
        assert_eq!(state.advance(), Duration::from_millis(1));
        assert_eq!(state.advance(), Duration::from_millis(1));

        let mut state = BackoffState::new(&bounds(0, 100));
        let delays: Vec<u64> = (0..3).map(|_| state.advance().as_millis() as u64).collect();
        assert_eq!(delays, vec![1, 2, 4]);
    }

    #[test]
    fn test_rate_limit_defaults_exceed_temporary_defaults() {
        let rate = BackoffBounds::rate_limited();
        let temp = BackoffBounds::temporary();
        assert!(rate.min_delay() > temp.min_delay());
        assert!(rate.max_delay() > temp.max_delay());
    }

    #[test]
    fn test_controller_categories_are_independent() {
        let controller = BackoffController::new(bounds(1_000, 8_000), bounds(10, 80));
        let mut states = controller.fresh_states();

        assert_eq!(
            controller.on_failure(&mut states, ErrorCategory::Temporary),
            BackoffDecision::RetryAfter(Duration::from_millis(10))
        );
        assert_eq!(
            controller.on_failure(&mut states, ErrorCategory::RateLimited),
            BackoffDecision::RetryAfter(Duration::from_millis(1_000))
        );
        assert_eq!(
            controller.on_failure(&mut states, ErrorCategory::Temporary),
            BackoffDecision::RetryAfter(Duration::from_millis(20))
        );
        assert_eq!(
            controller.on_failure(&mut states, ErrorCategory::Fatal),
            BackoffDecision::GiveUp
        );

        states.reset_all();
        for (_, state) in states.iter() {
            assert_eq!(state.consecutive_failures(), 0);
            assert_eq!(state.next_delay(), state.min_delay());
        }
    }

    #[test]
    fn test_retry_ceiling_escalates() {
        let controller =
            BackoffController::new(bounds(1_000, 8_000), bounds(10, 80).with_max_retries(2));
        let mut states = controller.fresh_states();

        assert!(matches!(
            controller.on_failure(&mut states, ErrorCategory::Temporary),
            BackoffDecision::RetryAfter(_)
        ));
        assert!(matches!(
            controller.on_failure(&mut states, ErrorCategory::Temporary),
            BackoffDecision::RetryAfter(_)
        ));
        assert_eq!(
            controller.on_failure(&mut states, ErrorCategory::Temporary),
            BackoffDecision::Exhausted { attempts: 3 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_for_current_delay() {
        let mut state = BackoffState::new(&bounds(1_000, 10_000));
        let start = tokio::time::Instant::now();
        BackoffController::backoff(&mut state).await;
        assert!(start.elapsed() >= Duration::from_millis(1_000));
        assert_eq!(state.next_delay(), Duration::from_millis(2_000));
    }
}
