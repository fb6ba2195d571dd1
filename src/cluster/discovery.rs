//! Find the Chrome workers of an OpenStack crawl cluster
//!
//! Worker hosts are listed in an Ansible OpenStack inventory dump (the output
//! of `openstack.py --list`). Each worker runs Chrome with remote debugging on
//! [`CHROME_DEBUG_PORT`]; its `/json/version` endpoint yields the DevTools
//! websocket URL the pool connects to.

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::runtime::throttled_map;
use crate::utils::constants::CHROME_DEBUG_PORT;

const VERSION_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    web_socket_debugger_url: String,
}

/// Inventory group holding the workers of one cluster
fn worker_group(os_prefix: &str) -> String {
    format!("meta-system_role_{os_prefix}_worker")
}

/// SSH addresses of the worker hosts in `inventory`, in prefix then group order
#[must_use]
pub fn parse_openstack_inventory(inventory: &Value, os_prefixes: &[String]) -> Vec<String> {
    let hostvars = &inventory["_meta"]["hostvars"];

    os_prefixes
        .iter()
        .filter_map(|prefix| inventory.get(worker_group(prefix))?.as_array())
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|host| hostvars.get(host)?.get("ansible_ssh_host")?.as_str())
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .collect()
}

/// Worker IPs from an inventory dump; an unreadable or malformed file yields none
pub fn read_openstack_ips(inventory_path: &Path, os_prefixes: &[String]) -> Vec<String> {
    let inventory = std::fs::read_to_string(inventory_path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(anyhow::Error::from));

    match inventory {
        Ok(inventory) => parse_openstack_inventory(&inventory, os_prefixes),
        Err(e) => {
            warn!("Ignoring inventory {}: {}", inventory_path.display(), e);
            Vec::new()
        }
    }
}

/// Ask a Chrome debugging server (`ip:port`) for its websocket URL.
///
/// Unreachable servers and malformed answers are logged and yield `None`.
pub async fn fetch_chrome_ws_url(client: &reqwest::Client, server_address: &str) -> Option<String> {
    let version_url = format!("http://{server_address}/json/version");
    debug!("Fetching Chrome WS URL: {}", version_url);

    let response = client
        .get(&version_url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);
    let info = match response {
        Ok(response) => response.json::<VersionInfo>().await,
        Err(e) => Err(e),
    };

    match info {
        Ok(info) => {
            debug!("Fetched Chrome WS URL: {}", info.web_socket_debugger_url);
            Some(info.web_socket_debugger_url)
        }
        Err(e) => {
            warn!("No websocket URL from {}: {}", version_url, e);
            None
        }
    }
}

/// Websocket URLs of every answering server, at most `max_parallel` queried at once
pub async fn discover_ws_urls(server_addresses: Vec<String>, max_parallel: usize) -> Result<Vec<String>> {
    let client = reqwest::Client::builder()
        .timeout(VERSION_FETCH_TIMEOUT)
        .build()?;

    let urls = throttled_map(server_addresses, max_parallel, move |address| {
        let client = client.clone();
        async move { Ok(fetch_chrome_ws_url(&client, &address).await) }
    })
    .await?;

    Ok(urls.into_iter().flatten().collect())
}

/// Websocket URLs of the cluster workers listed in an inventory dump
pub async fn read_chrome_ws_urls(
    inventory_path: &Path,
    os_prefixes: &[String],
    max_parallel: usize,
) -> Result<Vec<String>> {
    let addresses: Vec<String> = read_openstack_ips(inventory_path, os_prefixes)
        .into_iter()
        .map(|ip| format!("{ip}:{CHROME_DEBUG_PORT}"))
        .collect();
    info!("Found {} workers in {}", addresses.len(), inventory_path.display());

    discover_ws_urls(addresses, max_parallel).await
}
