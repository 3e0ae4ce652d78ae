//! Magpie Core Library
//!
//! The clone pipeline for the magpie website cloner:
//! - headless Chrome capture of rendered pages
//! - model-based reconstruction of simplified pages
//! - bounded asset fan-out and document assembly
//! - in-memory preview store

pub mod assets;
pub mod capture;
pub mod chrome;
pub mod clone;
pub mod extract;
pub mod outline;
pub mod reconstruct;
pub mod store;

use std::time::Duration;

use thiserror::Error;
use url::Url;

// Re-export key types
pub use assets::AssetFetcher;
pub use capture::Capturer;
pub use chrome::{ChromeConfig, ChromeManager};
pub use clone::CloneService;
pub use reconstruct::Reconstructor;
pub use store::PreviewStore;

#[derive(Error, Debug)]
pub enum CloneError {
    /// Malformed or non-http(s) target URL. Raised before any network
    /// activity.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The target page could not be reached: navigation timeout, DNS
    /// failure, or a terminal error response.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The browser process or CDP session failed.
    #[error("browser capture failed: {0}")]
    Capture(String),

    /// The model API failed: auth, quota, or a malformed response.
    #[error("model service error: {0}")]
    ExternalService(String),

    /// The service is missing configuration required for this operation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown preview identifier.
    #[error("preview {0} not found")]
    NotFound(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CloneError>;

/// Strategy used to produce the cloned document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneMode {
    /// Render the page in headless Chrome and inline its stylesheets.
    Capture,
    /// Ask the model for a simplified reconstruction of the page.
    Reconstruct,
}

impl CloneMode {
    /// Map the wire-level `is_small` flag onto a strategy.
    pub fn from_is_small(is_small: bool) -> Self {
        if is_small {
            CloneMode::Reconstruct
        } else {
            CloneMode::Capture
        }
    }
}

/// A page rendered by the headless browser.
///
/// Owned by a single clone operation; never persisted.
#[derive(Debug, Clone)]
pub struct CapturedPage {
    /// The navigated URL.
    pub url: Url,
    /// Serialized DOM after rendering and settling.
    pub html: String,
    /// Absolute URLs of external stylesheets referenced by the page.
    pub stylesheet_urls: Vec<Url>,
}

/// One fetched external resource, or the reason it could not be fetched.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub url: Url,
    pub content_type: Option<String>,
    pub body: Option<String>,
    pub error: Option<String>,
}

impl FetchedAsset {
    pub fn fetched(url: Url, content_type: Option<String>, body: String) -> Self {
        Self {
            url,
            content_type,
            body: Some(body),
            error: None,
        }
    }

    pub fn failed(url: Url, error: String) -> Self {
        Self {
            url,
            content_type: None,
            body: None,
            error: Some(error),
        }
    }

    pub fn is_fetched(&self) -> bool {
        self.body.is_some()
    }
}

/// A finished clone, stored for later preview lookups. Never mutated.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClonedDocument {
    /// Opaque unique token referencing this document.
    pub preview_id: String,
    /// The final standalone HTML.
    pub html: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Tunables for the clone pipeline.
#[derive(Debug, Clone)]
pub struct CloneConfig {
    /// User agent sent on plain-HTTP fetches.
    pub user_agent: String,
    /// Upper bound on navigation plus settling in the capture path.
    pub navigation_timeout: Duration,
    /// Fixed delay after navigation settles, for late DOM mutations.
    pub settle_delay: Duration,
    /// Per-asset request timeout.
    pub asset_timeout: Duration,
    /// Concurrency cap for the asset fan-out.
    pub max_asset_fetches: usize,
    /// Per-asset response size cap in bytes.
    pub max_asset_bytes: usize,
    /// Character budget for the page outline sent to the model.
    pub outline_budget: usize,
    /// Model driving the reconstruction path.
    pub model: String,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(500),
            asset_timeout: Duration::from_secs(10),
            max_asset_fetches: 5,
            max_asset_bytes: 2 * 1024 * 1024,
            outline_budget: 12_000,
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_mode_from_flag() {
        assert_eq!(CloneMode::from_is_small(true), CloneMode::Reconstruct);
        assert_eq!(CloneMode::from_is_small(false), CloneMode::Capture);
    }

    #[test]
    fn test_clone_config_default() {
        let config = CloneConfig::default();
        assert_eq!(config.max_asset_fetches, 5);
        assert!(config.navigation_timeout > config.settle_delay);
        assert!(config.user_agent.contains("Mozilla"));
    }

    #[test]
    fn test_fetched_asset_markers() {
        let url = Url::parse("https://example.com/a.css").unwrap();
        let ok = FetchedAsset::fetched(url.clone(), Some("text/css".into()), "body{}".into());
        let bad = FetchedAsset::failed(url, "HTTP 404".into());
        assert!(ok.is_fetched());
        assert!(!bad.is_fetched());
        assert!(bad.error.is_some());
    }
}
