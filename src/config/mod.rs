//! Configuration for the tab pool and the crawler binary
//!
//! `PoolConfig` carries the scheduler's tuning (backoff bounds, waiter order,
//! connect budget, tab viewport) and is built through a validating builder.
//! `CrawlerConfig` adds the bootstrap settings the binary reads from JSON.

pub mod builder;
pub mod getters;
pub mod types;

pub use builder::PoolConfigBuilder;
pub use types::{CrawlerConfig, PoolConfig, WaiterOrder};
