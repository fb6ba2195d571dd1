//! Tests for loading the crawler configuration from JSON

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

use stats_crawler::config::{CrawlerConfig, PoolConfig, WaiterOrder};

fn config_file(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = config_file(
        r#"{
            "remote_endpoints": ["ws://10.0.0.5:11229/devtools/browser/abc"],
            "inventory_path": "/etc/crawler/openstack.json",
            "os_prefixes": ["hurrosprod"],
            "remote_resource_count": 2,
            "pool": {
                "waiter_order": "fifo",
                "temporary_backoff": { "min_delay_ms": 1000, "max_delay_ms": 8000, "max_retries": 4 }
            }
        }"#,
    );

    let config = CrawlerConfig::from_file(file.path()).expect("valid config");

    assert_eq!(config.remote_endpoints.len(), 1);
    assert_eq!(config.inventory_path, Some(PathBuf::from("/etc/crawler/openstack.json")));
    assert_eq!(config.os_prefixes, vec!["hurrosprod"]);
    assert_eq!(config.remote_resource_count, 2);
    assert_eq!(config.local_resource_count, 1);
    assert_eq!(config.max_parallel_connects, 4);

    assert_eq!(config.pool.waiter_order(), WaiterOrder::Fifo);
    let temporary = config.pool.temporary_backoff();
    assert_eq!(temporary.min_delay(), Duration::from_secs(1));
    assert_eq!(temporary.max_delay(), Duration::from_secs(8));
    assert_eq!(temporary.max_retries, Some(4));
    assert_eq!(config.pool.rate_limit_backoff(), PoolConfig::default().rate_limit_backoff());
    assert!(config.pool.headless());
}

#[test]
fn test_empty_object_is_the_default_config() {
    let file = config_file("{}");
    let config = CrawlerConfig::from_file(file.path()).expect("valid config");
    assert_eq!(config, CrawlerConfig::default());
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = config_file(r#"{ "pool": { "rate_limit_backoff": { "min_delay_ms": 5000, "max_delay_ms": 100 } } }"#);
    let err = CrawlerConfig::from_file(file.path()).expect_err("inverted bounds");
    assert!(format!("{err:#}").contains("rate_limit_backoff"));

    let file = config_file(r#"{ "max_parallel_connects": 0 }"#);
    assert!(CrawlerConfig::from_file(file.path()).is_err());
}

#[test]
fn test_unparseable_and_missing_files() {
    let file = config_file("remote_endpoints = []");
    let err = CrawlerConfig::from_file(file.path()).expect_err("not JSON");
    assert!(err.to_string().contains("Failed to parse config file"));

    let dir = tempfile::tempdir().expect("temp dir");
    let err = CrawlerConfig::from_file(&dir.path().join("absent.json")).expect_err("missing");
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_validate_catches_hand_edited_config() {
    let mut config = CrawlerConfig::default();
    assert!(config.validate().is_ok());

    config.navigation_timeout_secs = 0;
    assert!(config.validate().is_err());
}
