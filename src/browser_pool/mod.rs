//! Chrome sessions as backing connections for the tab pool
//!
//! [`BrowserConnection`] wraps a chromiumoxide [`Browser`] (local or remote)
//! together with the task driving its CDP handler. Its tabs are
//! [`chromiumoxide::Page`]s.

pub mod page_checks;

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::{Page, cdp};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser_profile::{BrowserProfile, PROFILE_PREFIX, create_unique_profile_with_prefix};
use crate::browser_setup::{connect_browser, launch_browser};
use crate::config::PoolConfig;
use crate::resource_pool::{Connection, ResourcePool};

pub use page_checks::{ensure_html_document, fetch_title, is_html_document, navigate, wait_for_selector};

/// Pool of Chrome tabs
pub type BrowserPool = ResourcePool<BrowserConnection>;

/// A Chrome session owned by the pool
///
/// Dropping the connection aborts the handler task and removes the profile
/// directory of a launched browser.
#[derive(Debug)]
pub struct BrowserConnection {
    browser: Browser,
    handler: JoinHandle<()>,
    endpoint: String,
    /// Present only for browsers this process launched
    profile: Option<BrowserProfile>,
}

impl BrowserConnection {
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Whether this process started the browser (as opposed to attaching to it)
    pub fn is_local(&self) -> bool {
        self.profile.is_some()
    }
}

impl Connection for BrowserConnection {
    type Resource = Page;

    async fn launch(config: &PoolConfig) -> Result<Self> {
        let profile = create_unique_profile_with_prefix(PROFILE_PREFIX)?;
        let (browser, handler) = launch_browser(
            config.headless(),
            profile.path(),
            (config.viewport_width(), config.viewport_height()),
        )
        .await?;
        let endpoint = browser.websocket_address().clone();
        info!("Launched local browser at {}", endpoint);

        Ok(Self {
            browser,
            handler,
            endpoint,
            profile: Some(profile),
        })
    }

    async fn connect(address: &str) -> Result<Self> {
        let (browser, handler) = connect_browser(address).await?;
        Ok(Self {
            browser,
            handler,
            endpoint: address.to_string(),
            profile: None,
        })
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn resources(&self) -> Result<Vec<Page>> {
        self.browser
            .pages()
            .await
            .with_context(|| format!("Failed to list tabs of {}", self.endpoint))
    }

    async fn open_resource(&self) -> Result<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .with_context(|| format!("Failed to open a tab on {}", self.endpoint))
    }

    async fn initialize_resource(&self, page: &Page, config: &PoolConfig) -> Result<()> {
        page.execute(
            cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams::builder()
                .width(i64::from(config.viewport_width()))
                .height(i64::from(config.viewport_height()))
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(anyhow::Error::msg)?,
        )
        .await
        .context("Failed to set tab viewport")?;
        Ok(())
    }

    async fn close(mut self) -> Result<()> {
        debug!("Closing browser {}", self.endpoint);
        self.browser
            .close()
            .await
            .with_context(|| format!("Failed to close browser {}", self.endpoint))?;

        // Only a launched browser has a child process to reap
        if self.is_local()
            && let Err(e) = self.browser.wait().await
        {
            warn!("Failed to wait for browser {} to exit: {}", self.endpoint, e);
        }
        Ok(())
    }
}

impl Drop for BrowserConnection {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
