//! Getter methods for `PoolConfig`

use std::time::Duration;

use super::types::{PoolConfig, WaiterOrder};
use crate::retry::BackoffBounds;

impl PoolConfig {
    #[must_use]
    pub fn rate_limit_backoff(&self) -> BackoffBounds {
        self.rate_limit_backoff
    }

    #[must_use]
    pub fn temporary_backoff(&self) -> BackoffBounds {
        self.temporary_backoff
    }

    #[must_use]
    pub fn waiter_order(&self) -> WaiterOrder {
        self.waiter_order
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    #[must_use]
    pub fn viewport_height(&self) -> u32 {
        self.viewport_height
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }
}
