//! Shared configuration constants for stats_crawler
//!
//! Default values used by the pool, the browser adapter and the binary.

/// First rate-limit backoff: 10 minutes
///
/// The stats site lifts its throttling on the order of minutes to hours.
pub const DEFAULT_RATE_LIMIT_MIN_DELAY_MS: u64 = 10 * 60 * 1000;

/// Rate-limit backoff cap: 1 hour
pub const DEFAULT_RATE_LIMIT_MAX_DELAY_MS: u64 = 60 * 60 * 1000;

/// First transient-failure backoff: 5 seconds
pub const DEFAULT_TEMPORARY_MIN_DELAY_MS: u64 = 5 * 1000;

/// Transient-failure backoff cap: 5 minutes
pub const DEFAULT_TEMPORARY_MAX_DELAY_MS: u64 = 5 * 60 * 1000;

/// Budget for establishing a remote browser connection: 30 seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Budget for a single page navigation: 30 seconds
pub const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 30;

/// Viewport applied to every tab before it joins the pool.
///
/// Optional for scraping, but it makes debugging headed browsers easier.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1024;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 768;

/// Remote debugging port of the Chrome workers in the cluster
pub const CHROME_DEBUG_PORT: u16 = 11229;

/// Parallel connection attempts when attaching cluster workers
///
/// Each worker runs a single tab: more concurrency than that runs into the
/// stats site's rate limiting quickly.
pub const DEFAULT_MAX_PARALLEL_CONNECTS: usize = 4;

/// Chrome user agent string for launched browsers
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";
