//! Test utilities for the stats_crawler test suite
//!
//! `FakeConnection` stands in for a Chrome session. Its behavior is picked by
//! the address handed to `connect`, written `<kind>/<name>`:
//!
//! - `ok/<name>`: connects at once with no open tabs
//! - `tabs-<n>/<name>`: connects with `n` tabs already open
//! - `slow-<ms>/<name>`: connects after `ms` milliseconds
//! - `fail/<name>`: the connect attempt errors
//! - `badinit/<name>`: connects, but tab initialization fails
//! - `badclose/<name>`: connects, but closing it errors (after being recorded)
//!
//! Every test should use its own names: closes and initializations are
//! recorded in process-wide registries shared by parallel tests.

#![allow(dead_code)]

use anyhow::{Result, anyhow, bail};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stats_crawler::config::PoolConfig;
use stats_crawler::resource_pool::{Connection, Priority, ResourcePool};

static CLOSED: LazyLock<Mutex<HashSet<String>>> = LazyLock::new(|| Mutex::new(HashSet::new()));
static INITIALIZED: LazyLock<Mutex<HashMap<String, usize>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));
static NEXT_TAB: AtomicU64 = AtomicU64::new(1);

/// Handle to a fake tab
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FakeTab {
    pub serial: u64,
    pub endpoint: String,
}

#[derive(Debug)]
pub struct FakeConnection {
    endpoint: String,
    open_tabs: Mutex<Vec<FakeTab>>,
    fail_init: bool,
    fail_close: bool,
}

impl FakeConnection {
    fn with_tabs(endpoint: &str, tabs: usize, fail_init: bool) -> Self {
        let open_tabs = (0..tabs).map(|_| new_tab(endpoint)).collect();
        Self {
            endpoint: endpoint.to_string(),
            open_tabs: Mutex::new(open_tabs),
            fail_init,
            fail_close: false,
        }
    }
}

fn new_tab(endpoint: &str) -> FakeTab {
    FakeTab {
        serial: NEXT_TAB.fetch_add(1, Ordering::Relaxed),
        endpoint: endpoint.to_string(),
    }
}

impl Connection for FakeConnection {
    type Resource = FakeTab;

    async fn launch(_config: &PoolConfig) -> Result<Self> {
        Ok(Self::with_tabs("local", 1, false))
    }

    async fn connect(address: &str) -> Result<Self> {
        let (kind, _name) = address
            .split_once('/')
            .ok_or_else(|| anyhow!("malformed fake address {address}"))?;

        if kind == "ok" {
            return Ok(Self::with_tabs(address, 0, false));
        }
        if kind == "fail" {
            bail!("connection refused by {address}");
        }
        if kind == "badclose" {
            return Ok(Self {
                fail_close: true,
                ..Self::with_tabs(address, 0, false)
            });
        }
        if kind == "badinit" {
            return Ok(Self::with_tabs(address, 0, true));
        }
        if let Some(n) = kind.strip_prefix("tabs-") {
            return Ok(Self::with_tabs(address, n.parse()?, false));
        }
        if let Some(ms) = kind.strip_prefix("slow-") {
            tokio::time::sleep(Duration::from_millis(ms.parse()?)).await;
            return Ok(Self::with_tabs(address, 0, false));
        }
        bail!("unknown fake address kind {kind}")
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn resources(&self) -> Result<Vec<FakeTab>> {
        Ok(self.open_tabs.lock().clone())
    }

    async fn open_resource(&self) -> Result<FakeTab> {
        let tab = new_tab(&self.endpoint);
        self.open_tabs.lock().push(tab.clone());
        Ok(tab)
    }

    async fn initialize_resource(&self, _tab: &FakeTab, _config: &PoolConfig) -> Result<()> {
        if self.fail_init {
            bail!("could not set viewport on {}", self.endpoint);
        }
        *INITIALIZED.lock().entry(self.endpoint.clone()).or_default() += 1;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        CLOSED.lock().insert(self.endpoint.clone());
        if self.fail_close {
            bail!("browser at {} did not exit", self.endpoint);
        }
        Ok(())
    }
}

pub type FakePool = ResourcePool<FakeConnection>;

/// Whether a connection with this endpoint has been closed
pub fn was_closed(endpoint: &str) -> bool {
    CLOSED.lock().contains(endpoint)
}

/// Number of tabs initialized on this endpoint
pub fn initialized_count(endpoint: &str) -> usize {
    INITIALIZED.lock().get(endpoint).copied().unwrap_or(0)
}

/// Backoff short enough for real-time tests
pub fn fast_config() -> PoolConfig {
    PoolConfig::builder()
        .rate_limit_backoff(Duration::from_millis(20), Duration::from_millis(80))
        .temporary_backoff(Duration::from_millis(5), Duration::from_millis(20))
        .build()
        .expect("valid test config")
}

/// Pool with `tabs` tabs on one fake connection
pub async fn pool_with_tabs(name: &str, tabs: usize) -> Arc<FakePool> {
    pool_with_config(name, tabs, fast_config()).await
}

pub async fn pool_with_config(name: &str, tabs: usize, config: PoolConfig) -> Arc<FakePool> {
    let pool = FakePool::new(config);
    pool.connect_backing_connection(&format!("ok/{name}"), tabs)
        .await
        .expect("fake connection admitted");
    pool
}

/// Poll until `level` has `depth` live waiters
pub async fn wait_for_queue_depth(pool: &FakePool, level: Priority, depth: usize) {
    wait_until(|| {
        pool.queue_depths_by_priority()
            .ok()
            .and_then(|depths| depths.get(&level).copied())
            == Some(depth)
    })
    .await;
}

/// Poll until `n` tabs are checked out
pub async fn wait_for_in_use(pool: &FakePool, n: usize) {
    wait_until(|| pool.in_use_count().ok() == Some(n)).await;
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}
