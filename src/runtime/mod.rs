//! Async helpers shared by the binary and the cluster bootstrap

pub mod throttled_map;

pub use throttled_map::{BoundedConcurrencyRunner, throttled_map};
