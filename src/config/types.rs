//! Core configuration types for the tab pool and the crawler binary

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::retry::BackoffBounds;
use crate::utils::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_PARALLEL_CONNECTS, DEFAULT_NAVIGATION_TIMEOUT_SECS,
    DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH,
};

/// Which waiter a level serves first when a tab frees up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaiterOrder {
    /// Newest request first
    #[default]
    Lifo,
    /// Oldest request first
    Fifo,
}

/// Settings for a [`ResourcePool`](crate::resource_pool::ResourcePool)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub(crate) rate_limit_backoff: BackoffBounds,
    pub(crate) temporary_backoff: BackoffBounds,
    pub(crate) waiter_order: WaiterOrder,
    /// Budget for attaching to a remote browser
    pub(crate) connect_timeout_secs: u64,
    pub(crate) viewport_width: u32,
    pub(crate) viewport_height: u32,
    pub(crate) headless: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            rate_limit_backoff: BackoffBounds::rate_limited(),
            temporary_backoff: BackoffBounds::temporary(),
            waiter_order: WaiterOrder::Lifo,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            headless: true,
        }
    }
}

/// Everything the `stats-crawler` binary needs to bring a pool up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub pool: PoolConfig,
    /// DevTools websocket URLs of remote browsers to attach
    pub remote_endpoints: Vec<String>,
    /// Ansible OpenStack inventory dump listing worker hosts
    pub inventory_path: Option<PathBuf>,
    /// Worker OS prefixes to look up in the inventory (`meta-system_role_<prefix>_worker`)
    pub os_prefixes: Vec<String>,
    /// Tabs opened on the local browser; 0 skips launching one
    pub local_resource_count: usize,
    /// Tabs opened on every remote browser
    pub remote_resource_count: usize,
    /// Remote browsers attached at the same time during startup
    pub max_parallel_connects: usize,
    pub navigation_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            remote_endpoints: Vec::new(),
            inventory_path: None,
            os_prefixes: Vec::new(),
            local_resource_count: 1,
            remote_resource_count: 1,
            max_parallel_connects: DEFAULT_MAX_PARALLEL_CONNECTS,
            navigation_timeout_secs: DEFAULT_NAVIGATION_TIMEOUT_SECS,
        }
    }
}

impl CrawlerConfig {
    /// Load from a JSON file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        super::builder::validate_pool_config(&self.pool)?;
        if self.max_parallel_connects == 0 {
            anyhow::bail!("max_parallel_connects must be at least 1");
        }
        if self.navigation_timeout_secs == 0 {
            anyhow::bail!("navigation_timeout_secs must be at least 1");
        }
        Ok(())
    }
}
