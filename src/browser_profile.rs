//! Chrome profile directories for launched browsers
//!
//! Each launch gets its own UUID-named directory so concurrent browsers never
//! fight over Chrome's SingletonLock.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix for profile directories created by the crawler
pub const PROFILE_PREFIX: &str = "stats_crawler_chrome";

/// RAII wrapper for a Chrome profile directory
///
/// The directory is removed on drop unless `into_path()` is called.
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl BrowserProfile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            cleanup_on_drop: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory on disk and hand back its path
    pub fn into_path(mut self) -> PathBuf {
        self.cleanup_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            debug!("Removing browser profile {}", self.path.display());
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to remove profile directory {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Create `<temp>/<prefix>_<uuid>`
pub fn create_unique_profile_with_prefix(prefix: &str) -> Result<BrowserProfile> {
    create_unique_profile_in(&std::env::temp_dir(), prefix)
}

/// Create `<parent>/<prefix>_<uuid>`
pub fn create_unique_profile_in(parent: &Path, prefix: &str) -> Result<BrowserProfile> {
    let path = parent.join(format!("{}_{}", prefix, Uuid::new_v4()));

    // create_dir, not create_dir_all: fails if the directory already exists
    std::fs::create_dir(&path)
        .with_context(|| format!("Failed to create profile directory: {}", path.display()))?;

    info!("Created Chrome profile directory: {}", path.display());
    Ok(BrowserProfile::new(path))
}
