//! Fluent builder for `PoolConfig`
//!
//! Every field has a default, so `PoolConfig::builder().build()` is valid.
//! `build()` rejects combinations the pool cannot run with.

use anyhow::{Result, bail};
use std::time::Duration;

use super::types::{PoolConfig, WaiterOrder};
use crate::retry::BackoffBounds;

#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfig {
    #[must_use]
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Start a builder from this config's values
    #[must_use]
    pub fn to_builder(&self) -> PoolConfigBuilder {
        PoolConfigBuilder {
            config: self.clone(),
        }
    }
}

impl PoolConfigBuilder {
    /// Delays applied when the upstream site throttles us
    #[must_use]
    pub fn rate_limit_backoff(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        let max_retries = self.config.rate_limit_backoff.max_retries;
        self.config.rate_limit_backoff = BackoffBounds {
            max_retries,
            ..BackoffBounds::new(min_delay, max_delay)
        };
        self
    }

    /// Delays applied after navigation or wait timeouts and other flaky failures
    #[must_use]
    pub fn temporary_backoff(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        let max_retries = self.config.temporary_backoff.max_retries;
        self.config.temporary_backoff = BackoffBounds {
            max_retries,
            ..BackoffBounds::new(min_delay, max_delay)
        };
        self
    }

    /// Escalate rate-limit failures after this many consecutive retries
    #[must_use]
    pub fn rate_limit_max_retries(mut self, retries: u32) -> Self {
        self.config.rate_limit_backoff.max_retries = Some(retries);
        self
    }

    /// Escalate temporary failures after this many consecutive retries
    #[must_use]
    pub fn temporary_max_retries(mut self, retries: u32) -> Self {
        self.config.temporary_backoff.max_retries = Some(retries);
        self
    }

    #[must_use]
    pub fn waiter_order(mut self, order: WaiterOrder) -> Self {
        self.config.waiter_order = order;
        self
    }

    #[must_use]
    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    pub fn build(self) -> Result<PoolConfig> {
        validate_pool_config(&self.config)?;
        Ok(self.config)
    }
}

pub(crate) fn validate_pool_config(config: &PoolConfig) -> Result<()> {
    for (name, bounds) in [
        ("rate_limit_backoff", &config.rate_limit_backoff),
        ("temporary_backoff", &config.temporary_backoff),
    ] {
        if bounds.min_delay_ms == 0 {
            bail!("{name}.min_delay_ms must be greater than zero");
        }
        if bounds.min_delay_ms > bounds.max_delay_ms {
            bail!(
                "{name}.min_delay_ms ({}) exceeds max_delay_ms ({})",
                bounds.min_delay_ms,
                bounds.max_delay_ms
            );
        }
    }
    if config.connect_timeout_secs == 0 {
        bail!("connect_timeout_secs must be at least 1");
    }
    if config.viewport_width == 0 || config.viewport_height == 0 {
        bail!(
            "viewport must be non-empty, got {}x{}",
            config.viewport_width,
            config.viewport_height
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_crawler_tuning() {
        let config = PoolConfig::builder().build().expect("defaults are valid");
        assert_eq!(config.rate_limit_backoff().min_delay(), Duration::from_secs(600));
        assert_eq!(config.rate_limit_backoff().max_delay(), Duration::from_secs(3600));
        assert_eq!(config.temporary_backoff().min_delay(), Duration::from_secs(5));
        assert_eq!(config.temporary_backoff().max_delay(), Duration::from_secs(300));
        assert_eq!(config.rate_limit_backoff().max_retries, None);
        assert_eq!(config.waiter_order(), WaiterOrder::Lifo);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!((config.viewport_width(), config.viewport_height()), (1024, 768));
    }

    #[test]
    fn test_retry_ceiling_survives_bounds_change() {
        let config = PoolConfig::builder()
            .temporary_max_retries(3)
            .temporary_backoff(Duration::from_millis(10), Duration::from_millis(40))
            .build()
            .expect("valid config");
        assert_eq!(config.temporary_backoff().max_retries, Some(3));
        assert_eq!(config.temporary_backoff().min_delay_ms, 10);
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let err = PoolConfig::builder()
            .rate_limit_backoff(Duration::from_secs(10), Duration::from_secs(1))
            .build()
            .expect_err("min above max");
        assert!(err.to_string().contains("rate_limit_backoff"));
    }

    #[test]
    fn test_rejects_zero_timeout_and_empty_viewport() {
        assert!(PoolConfig::builder().connect_timeout_secs(0).build().is_err());
        assert!(PoolConfig::builder().viewport(0, 768).build().is_err());
    }
}
