//! Chrome browser lifecycle management
//!
//! Discovers a system Chrome/Chromium binary, lazily launches one shared
//! headless instance, and caps the number of concurrently open page
//! contexts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::{CloneError, Result};

/// Configuration for the shared browser instance.
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    /// Explicit Chrome binary path; discovered from the system when unset.
    pub chrome_path: Option<PathBuf>,
    /// Run without a visible window.
    pub headless: bool,
    /// Maximum number of concurrently open page contexts.
    pub max_contexts: usize,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            max_contexts: 4,
        }
    }
}

/// Handle to a running browser instance.
pub struct BrowserHandle {
    pub browser: Browser,
    _event_loop: tokio::task::JoinHandle<()>,
}

/// Lazily launches and shares a single browser across clone operations.
///
/// Page contexts are the expensive resource: `acquire_context` gates their
/// creation behind a semaphore whose permit is released when the guard
/// drops, so a failed or cancelled clone can never leak a slot.
pub struct ChromeManager {
    config: ChromeConfig,
    browser: Mutex<Option<Arc<BrowserHandle>>>,
    contexts: Arc<Semaphore>,
}

impl ChromeManager {
    pub fn new(config: ChromeConfig) -> Self {
        let contexts = Arc::new(Semaphore::new(config.max_contexts.max(1)));
        Self {
            config,
            browser: Mutex::new(None),
            contexts,
        }
    }

    /// Wait for a free page-context slot.
    pub async fn acquire_context(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.contexts)
            .acquire_owned()
            .await
            .map_err(|_| CloneError::Capture("browser context pool is closed".to_string()))
    }

    /// Get the shared browser, launching it on first use.
    pub async fn browser(&self) -> Result<Arc<BrowserHandle>> {
        let mut slot = self.browser.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let chrome_path = match self.config.chrome_path.clone() {
            Some(path) if path.exists() => path,
            Some(path) => {
                return Err(CloneError::Capture(format!(
                    "configured Chrome binary {:?} does not exist",
                    path
                )))
            }
            None => find_system_chrome().ok_or_else(|| {
                CloneError::Capture("no Chrome or Chromium binary found on this system".to_string())
            })?,
        };

        let handle = Arc::new(launch_browser(&chrome_path, self.config.headless).await?);
        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }
}

/// Launch a browser instance with the given Chrome path.
async fn launch_browser(chrome_path: &Path, headless: bool) -> Result<BrowserHandle> {
    debug!("Launching browser from {:?}", chrome_path);

    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome_path)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage");
    if !headless {
        builder = builder.with_head();
    }

    let (browser, mut handler) = Browser::launch(
        builder
            .build()
            .map_err(|e| CloneError::Capture(e.to_string()))?,
    )
    .await
    .map_err(|e| CloneError::Capture(format!("failed to launch browser: {}", e)))?;

    let event_loop = tokio::spawn(async move { while handler.next().await.is_some() {} });

    info!("Browser ready: {:?}", chrome_path);
    Ok(BrowserHandle {
        browser,
        _event_loop: event_loop,
    })
}

/// Find Chrome installed on the system.
pub fn find_system_chrome() -> Option<PathBuf> {
    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        vec![]
    };

    // Check hardcoded paths first
    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }

    // Try PATH
    which::which("google-chrome")
        .or_else(|_| which::which("google-chrome-stable"))
        .or_else(|_| which::which("chromium"))
        .or_else(|_| which::which("chromium-browser"))
        .ok()
}
