//! Rendered-page capture via headless Chrome
//!
//! Settling policy: navigation is awaited through CDP
//! (`wait_for_navigation`), then a fixed settle delay absorbs late DOM
//! mutations. The whole capture is bounded by
//! `CloneConfig.navigation_timeout`; exceeding it is a `Navigation` error,
//! never a hang.

use std::time::Duration;

use chromiumoxide::Page;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::chrome::{ChromeConfig, ChromeManager};
use crate::{extract, CapturedPage, CloneConfig, CloneError, Result};

/// Status of the document navigation, where the browser exposes it
/// (0 on older builds, in which case the check is skipped).
const NAVIGATION_STATUS_JS: &str =
    "window.performance.getEntriesByType('navigation')[0]?.responseStatus ?? 0";

pub struct Capturer {
    manager: ChromeManager,
    navigation_timeout: Duration,
    settle_delay: Duration,
}

impl Capturer {
    pub fn new(chrome: ChromeConfig, config: &CloneConfig) -> Self {
        Self {
            manager: ChromeManager::new(chrome),
            navigation_timeout: config.navigation_timeout,
            settle_delay: config.settle_delay,
        }
    }

    /// Render `url` and return the serialized DOM plus discovered
    /// stylesheet URLs.
    ///
    /// The page context is closed on every exit path, and its semaphore
    /// permit released, including timeout and cancellation.
    pub async fn capture(&self, url: &Url) -> Result<CapturedPage> {
        let _context = self.manager.acquire_context().await?;
        let handle = self.manager.browser().await?;

        info!(%url, "capturing page");
        let page = handle
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| CloneError::Capture(format!("failed to open page: {}", e)))?;

        let result = match timeout(self.navigation_timeout, self.render(&page, url)).await {
            Ok(result) => result,
            Err(_) => Err(CloneError::Navigation(format!(
                "{} did not settle within {:?}",
                url, self.navigation_timeout
            ))),
        };

        if let Err(e) = page.close().await {
            warn!("failed to close page: {}", e);
        }
        result
    }

    async fn render(&self, page: &Page, url: &Url) -> Result<CapturedPage> {
        page.goto(url.as_str())
            .await
            .map_err(|e| CloneError::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| CloneError::Navigation(e.to_string()))?;

        // Late DOM mutations settle here
        tokio::time::sleep(self.settle_delay).await;

        let status = navigation_status(page).await;
        if status >= 400 {
            return Err(CloneError::Navigation(format!(
                "{} answered HTTP {}",
                url, status
            )));
        }

        let html = page
            .content()
            .await
            .map_err(|e| CloneError::Capture(e.to_string()))?;
        let stylesheet_urls = extract::stylesheet_urls(&html, url);

        debug!(
            bytes = html.len(),
            stylesheets = stylesheet_urls.len(),
            "page captured"
        );
        Ok(CapturedPage {
            url: url.clone(),
            html,
            stylesheet_urls,
        })
    }
}

async fn navigation_status(page: &Page) -> i64 {
    match page.evaluate(NAVIGATION_STATUS_JS).await {
        Ok(value) => value.into_value::<i64>().unwrap_or(0),
        Err(e) => {
            debug!("navigation status probe failed: {}", e);
            0
        }
    }
}
