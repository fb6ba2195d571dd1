//! Remote browser discovery

pub mod discovery;

pub use discovery::{
    discover_ws_urls, fetch_chrome_ws_url, parse_openstack_inventory, read_chrome_ws_urls,
    read_openstack_ips,
};
