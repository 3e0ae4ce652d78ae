//! Clone orchestration
//!
//! The single entry point for a clone operation: validate the target URL,
//! dispatch on the requested strategy, assemble the final document, and
//! commit it to the preview store. The store write is the last step, so a
//! failed clone never leaves a partial document behind.

use std::collections::HashMap;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::assets::AssetFetcher;
use crate::capture::Capturer;
use crate::chrome::ChromeConfig;
use crate::reconstruct::Reconstructor;
use crate::store::PreviewStore;
use crate::{extract, CapturedPage, CloneConfig, CloneError, CloneMode, ClonedDocument, FetchedAsset, Result};

pub struct CloneService {
    config: CloneConfig,
    capturer: Capturer,
    fetcher: AssetFetcher,
    reconstructor: Option<Reconstructor>,
    store: PreviewStore,
}

impl CloneService {
    /// Build the service. `api_key` enables the reconstruction path; the
    /// store is passed in so callers can share or fake it.
    pub fn new(
        config: CloneConfig,
        chrome: ChromeConfig,
        api_key: Option<String>,
        store: PreviewStore,
    ) -> Result<Self> {
        let fetcher = AssetFetcher::new(&config)?;
        let capturer = Capturer::new(chrome, &config);
        let reconstructor = match api_key {
            Some(key) => Some(Reconstructor::new(key, &config)?),
            None => None,
        };

        Ok(Self {
            config,
            capturer,
            fetcher,
            reconstructor,
            store,
        })
    }

    pub fn has_reconstructor(&self) -> bool {
        self.reconstructor.is_some()
    }

    pub fn store(&self) -> &PreviewStore {
        &self.store
    }

    /// Clone `raw_url` with the given strategy and store the result.
    pub async fn clone_site(&self, raw_url: &str, mode: CloneMode) -> Result<ClonedDocument> {
        let url = parse_target_url(raw_url)?;
        info!(%url, ?mode, "clone requested");

        let html = match mode {
            CloneMode::Reconstruct => self.reconstruct_path(&url).await?,
            CloneMode::Capture => self.capture_path(&url).await?,
        };

        let document = self.store.put(html).await;
        info!(preview_id = %document.preview_id, "clone stored");
        Ok(document)
    }

    /// Look up a previously stored clone.
    pub async fn preview(&self, preview_id: &str) -> Result<ClonedDocument> {
        self.store.get(preview_id).await
    }

    async fn reconstruct_path(&self, url: &Url) -> Result<String> {
        let reconstructor = self.reconstructor.as_ref().ok_or_else(|| {
            CloneError::Config(
                "GEMINI_API_KEY is not set; the reconstruction path is unavailable".to_string(),
            )
        })?;

        let page_html = self.fetcher.fetch_page(url).await?;
        let summary = extract::summarize_page(&page_html, url, self.config.outline_budget);
        reconstructor.reconstruct(url, &summary).await
    }

    async fn capture_path(&self, url: &Url) -> Result<String> {
        let captured = self.capturer.capture(url).await?;
        let assets = self.fetcher.fetch_all(&captured.stylesheet_urls).await;

        let failed = assets.values().filter(|asset| !asset.is_fetched()).count();
        if failed > 0 {
            warn!(failed, "stylesheets could not be fetched and were dropped");
        }

        Ok(assemble_document(&captured, &assets))
    }
}

/// Validate the clone target before any network activity.
fn parse_target_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| CloneError::InvalidInput(format!("{:?} is not an absolute URL: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CloneError::InvalidInput(format!(
                "unsupported scheme {:?}, expected http or https",
                other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(CloneError::InvalidInput("URL has no host".to_string()));
    }
    Ok(url)
}

/// Turn a captured page into a standalone document: inline fetched
/// stylesheets, drop failed ones, and inject a `<base>` tag so remaining
/// relative references resolve against the origin.
fn assemble_document(captured: &CapturedPage, assets: &HashMap<Url, FetchedAsset>) -> String {
    let document = Html::parse_document(&captured.html);
    let mut output = document.html();

    if let Ok(selector) = Selector::parse(r#"link[rel~="stylesheet"]"#) {
        for link in document.select(&selector) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Ok(resolved) = captured.url.join(href) else {
                continue;
            };

            let replacement = match assets.get(&resolved) {
                Some(asset) if asset.is_fetched() => {
                    let css = rewrite_css_urls(asset.body.as_deref().unwrap_or(""), &resolved);
                    format!("<style data-origin=\"{}\">\n{}\n</style>", resolved, css)
                }
                // Fetch failed or URL was skipped: drop the reference
                _ => String::new(),
            };
            output = output.replacen(&link.html(), &replacement, 1);
        }
    }

    inject_base_href(&output, &captured.url)
}

/// Rewrite relative `url(...)` and `@import` references in CSS so an
/// inlined stylesheet keeps resolving against its origin.
fn rewrite_css_urls(css: &str, stylesheet_url: &Url) -> String {
    let url_pattern = Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).unwrap();
    let rewritten = url_pattern.replace_all(css, |caps: &regex::Captures| {
        let target = caps[1].trim();
        if is_absolute_ref(target) {
            caps[0].to_string()
        } else {
            match stylesheet_url.join(target) {
                Ok(resolved) => format!("url(\"{}\")", resolved),
                Err(_) => caps[0].to_string(),
            }
        }
    });

    let import_pattern = Regex::new(r#"@import\s+['"]([^'"]+)['"]"#).unwrap();
    import_pattern
        .replace_all(&rewritten, |caps: &regex::Captures| {
            let target = caps[1].trim();
            if is_absolute_ref(target) {
                caps[0].to_string()
            } else {
                match stylesheet_url.join(target) {
                    Ok(resolved) => format!("@import \"{}\"", resolved),
                    Err(_) => caps[0].to_string(),
                }
            }
        })
        .into_owned()
}

fn is_absolute_ref(target: &str) -> bool {
    target.starts_with("http://")
        || target.starts_with("https://")
        || target.starts_with("data:")
        || target.starts_with('#')
}

fn inject_base_href(html: &str, base_url: &Url) -> String {
    if html.contains("<base ") {
        return html.to_string();
    }
    let tag = format!("<head><base href=\"{}\">", base_url);
    if html.contains("<head>") {
        html.replacen("<head>", &tag, 1)
    } else {
        format!("<base href=\"{}\">{}", base_url, html)
    }
}
