//! Helpers for task bodies running on pooled tabs
//!
//! Each helper reports its failures in the shape the pool's retry loop
//! understands: timeouts come back as temporary errors and the stats site's
//! throttling page comes back as a [`RateLimitError`].

use anyhow::{Context, Result, anyhow};
use chromiumoxide::Page;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::retry::{NAVIGATION_TIMEOUT_MESSAGE, RateLimitError, WAIT_TIMEOUT_MESSAGE};

/// Message carried by the error raised for a non-HTML response
pub const NON_HTML_DOCUMENT_MESSAGE: &str = "Non-HTML document received while crawling";

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

const HAS_DOCUMENT_MARKUP_JS: &str =
    "(() => document.styleSheets.length !== 0 || document.doctype !== null)()";

/// Load `url` and wait for the navigation to settle
pub async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<()> {
    let load = async {
        page.goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;
        page.wait_for_navigation()
            .await
            .with_context(|| format!("Failed to wait for {url} to load"))?;
        Ok::<_, anyhow::Error>(())
    };

    match tokio::time::timeout(timeout, load).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "{NAVIGATION_TIMEOUT_MESSAGE}: {} ms exceeded loading {url}",
            timeout.as_millis()
        )),
    }
}

/// Poll until `selector` matches an element on the page
pub async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        if page.find_element(selector).await.is_ok() {
            debug!("Selector {} appeared after {:?}", selector, start.elapsed());
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(anyhow!(
                "{WAIT_TIMEOUT_MESSAGE} {} ms exceeded waiting for {selector}",
                timeout.as_millis()
            ));
        }
        tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
    }
}

/// Whether the tab holds a real HTML page.
///
/// A page with a title counts; otherwise it needs a stylesheet or a doctype.
pub async fn is_html_document(page: &Page) -> Result<bool> {
    let title = page.get_title().await.context("Failed to read page title")?;
    if title.is_some_and(|t| !t.is_empty()) {
        return Ok(true);
    }

    page.evaluate(HAS_DOCUMENT_MARKUP_JS)
        .await
        .context("Failed to inspect document")?
        .into_value::<bool>()
        .map_err(|e| anyhow!("Unexpected document check result: {e}"))
}

/// Raise [`RateLimitError`] when the stats site served its throttling response
pub async fn ensure_html_document(page: &Page) -> Result<()> {
    if is_html_document(page).await? {
        Ok(())
    } else {
        let url = page.url().await.ok().flatten().unwrap_or_default();
        warn!("Non-HTML document at {}, most likely rate limited", url);
        Err(RateLimitError::new(NON_HTML_DOCUMENT_MESSAGE).into())
    }
}

/// Navigate to `url`, check it is a real page and return its title
pub async fn fetch_title(page: &Page, url: &str, timeout: Duration) -> Result<String> {
    navigate(page, url, timeout).await?;
    ensure_html_document(page).await?;
    Ok(page
        .get_title()
        .await
        .context("Failed to read page title")?
        .unwrap_or_default())
}
