// stats-crawler: fetch pages from the stats site through the shared tab pool.
//
// Attaches the configured remote browsers (and cluster workers found in an
// inventory dump), launches a local browser, crawls the URLs given on the
// command line at the requested priority and prints the results together
// with the pool's status snapshot as JSON.

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use stats_crawler::browser_pool::{BrowserPool, fetch_title};
use stats_crawler::cluster::read_chrome_ws_urls;
use stats_crawler::config::CrawlerConfig;
use stats_crawler::logging::init_logging;
use stats_crawler::resource_pool::{PoolStatus, Priority};
use stats_crawler::runtime::throttled_map;

#[derive(Debug, Parser)]
#[command(name = "stats-crawler")]
#[command(about = "Crawl stats pages through a priority-scheduled pool of browser tabs", long_about = None)]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Priority the URLs are crawled at (interactive, high, medium, low, background).
    #[arg(long, default_value = "medium")]
    priority: Priority,

    /// DevTools websocket URL of a remote browser. Repeatable.
    #[arg(long = "remote", value_name = "WS_URL")]
    remotes: Vec<String>,

    /// Ansible OpenStack inventory dump listing worker hosts.
    #[arg(long, value_name = "PATH")]
    inventory: Option<PathBuf>,

    /// Cluster prefix to look up in the inventory. Repeatable.
    #[arg(long = "os-prefix", value_name = "PREFIX")]
    os_prefixes: Vec<String>,

    /// Tabs to open on the local browser (0 skips launching it).
    #[arg(long, value_name = "N")]
    local_tabs: Option<usize>,

    /// Tabs to open on each remote browser.
    #[arg(long, value_name = "N")]
    remote_tabs: Option<usize>,

    /// Show the local browser window.
    #[arg(long)]
    headed: bool,

    /// Pages to crawl.
    #[arg(required = true)]
    urls: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PageResult {
    url: String,
    title: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    results: Vec<PageResult>,
    status: PoolStatus,
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("stats-crawler error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let pool = BrowserPool::new(config.pool.clone());

    let outcome = tokio::select! {
        result = crawl(&pool, &config, &cli) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            None
        }
    };

    let report = match outcome {
        Some(Ok(results)) => Some(Report {
            results,
            status: pool.status()?,
        }),
        Some(Err(e)) => {
            shutdown(&pool).await;
            return Err(e);
        }
        None => None,
    };

    shutdown(&pool).await;

    if let Some(report) = report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<CrawlerConfig> {
    let mut config = match &cli.config {
        Some(path) => CrawlerConfig::from_file(path)?,
        None => CrawlerConfig::default(),
    };

    config.remote_endpoints.extend(cli.remotes.iter().cloned());
    if let Some(inventory) = &cli.inventory {
        config.inventory_path = Some(inventory.clone());
    }
    if !cli.os_prefixes.is_empty() {
        config.os_prefixes = cli.os_prefixes.clone();
    }
    if let Some(n) = cli.local_tabs {
        config.local_resource_count = n;
    }
    if let Some(n) = cli.remote_tabs {
        config.remote_resource_count = n;
    }
    if cli.headed {
        config.pool = config.pool.to_builder().headless(false).build()?;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Bring up every browser, then crawl the URLs
async fn crawl(pool: &Arc<BrowserPool>, config: &CrawlerConfig, cli: &Cli) -> Result<Vec<PageResult>> {
    attach_browsers(pool, config).await?;

    let tabs = pool.live_resource_count()?;
    if tabs == 0 {
        bail!("No browser tabs available");
    }
    info!("Crawling {} URLs on {} tabs at {} priority", cli.urls.len(), tabs, cli.priority);

    let view = pool.at_priority(cli.priority);
    let timeout = Duration::from_secs(config.navigation_timeout_secs);
    let crawls = cli.urls.iter().map(|url| {
        let view = view.clone();
        async move {
            let outcome = view
                .with_resource(url, |page| {
                    let url = url.clone();
                    async move { fetch_title(&page, &url, timeout).await }
                })
                .await;
            match outcome {
                Ok(title) => PageResult {
                    url: url.clone(),
                    title: Some(title),
                    error: None,
                },
                Err(e) => PageResult {
                    url: url.clone(),
                    title: None,
                    error: Some(format!("{:#}", anyhow::Error::new(e))),
                },
            }
        }
    });

    Ok(futures::future::join_all(crawls).await)
}

/// Attach remote browsers in parallel, then launch the local one
async fn attach_browsers(pool: &Arc<BrowserPool>, config: &CrawlerConfig) -> Result<()> {
    let mut endpoints = config.remote_endpoints.clone();
    if let Some(inventory) = &config.inventory_path {
        endpoints.extend(
            read_chrome_ws_urls(inventory, &config.os_prefixes, config.max_parallel_connects).await?,
        );
    }

    if !endpoints.is_empty() {
        let remote_tabs = config.remote_resource_count;
        let connect_pool = Arc::clone(pool);
        let attached = throttled_map(endpoints, config.max_parallel_connects, move |endpoint: String| {
            let pool = Arc::clone(&connect_pool);
            async move {
                match pool.connect_backing_connection(&endpoint, remote_tabs).await {
                    Ok(ids) => {
                        info!("Connected to worker {} ({} tabs)", endpoint, ids.len());
                        Ok(true)
                    }
                    Err(e) => {
                        warn!("Skipping worker {}: {:#}", endpoint, anyhow::Error::new(e));
                        Ok(false)
                    }
                }
            }
        })
        .await?;
        info!(
            "Attached {} of {} remote browsers",
            attached.iter().filter(|ok| **ok).count(),
            attached.len()
        );
    }

    if config.local_resource_count > 0 {
        pool.launch_local_connection(config.local_resource_count)
            .await
            .context("Failed to start the local browser")?;
    }
    Ok(())
}

async fn shutdown(pool: &BrowserPool) {
    if let Err(e) = pool.shutdown().await {
        warn!("Pool shutdown: {}", e);
    }
}
