//! Priority-scheduled browser tab pool for crawling a rate-limited stats site
//!
//! The [`ResourcePool`] shares a handful of Chrome tabs between many async
//! crawl tasks. Callers pick a [`Priority`] and hand in a task; the pool
//! assigns a tab (or queues the request), retries rate-limited and transient
//! failures with per-tab exponential backoff, and always takes the tab back.

pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod cluster;
pub mod config;
pub mod logging;
pub mod resource_pool;
pub mod retry;
pub mod runtime;
pub mod utils;

pub use browser_pool::{BrowserConnection, BrowserPool};
pub use browser_setup::{connect_browser, download_managed_browser, find_browser_executable, launch_browser};
pub use cluster::read_chrome_ws_urls;
pub use config::{CrawlerConfig, PoolConfig, PoolConfigBuilder, WaiterOrder};
pub use resource_pool::{
    Connection, Lease, PoolError, PoolStatus, PrioritizedPool, Priority, ResourceDiagnostics,
    ResourceId, ResourcePool,
};
pub use retry::{
    BackoffBounds, ErrorCategory, RateLimitError, TemporaryError, catch_temporary_error, classify,
};
pub use runtime::{BoundedConcurrencyRunner, throttled_map};
