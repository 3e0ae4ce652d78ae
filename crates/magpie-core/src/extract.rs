//! Lightweight page analysis without a browser
//!
//! Shared by both clone paths: the capture path uses stylesheet discovery
//! on the rendered DOM, the reconstruction path summarizes a plain-HTTP
//! fetch for the model prompt.

use scraper::{Html, Selector};
use url::Url;

use crate::outline;

/// Images listed in a page summary are capped to keep the prompt small.
const MAX_SUMMARY_IMAGES: usize = 12;

/// Metadata lifted from the page head.
#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    pub description: Option<String>,
    pub viewport: Option<String>,
    pub charset: Option<String>,
}

/// An image reference with its alt text.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub url: Url,
    pub alt: String,
}

/// Everything the reconstruction prompt needs to know about a page.
#[derive(Debug, Clone)]
pub struct PageSummary {
    pub title: Option<String>,
    pub meta: PageMeta,
    pub images: Vec<ImageRef>,
    pub icons: Vec<Url>,
    /// Compact text outline of the page body.
    pub outline: String,
}

/// Extract the page title from HTML.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;

    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Absolute URLs of external stylesheets referenced by the document,
/// deduplicated in document order.
pub fn stylesheet_urls(html: &str, base_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse(r#"link[rel~="stylesheet"]"#) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut urls = Vec::new();
    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if let Ok(resolved) = base_url.join(href) {
            if matches!(resolved.scheme(), "http" | "https") && !urls.contains(&resolved) {
                urls.push(resolved);
            }
        }
    }
    urls
}

/// Summarize a page for the reconstruction prompt.
pub fn summarize_page(html: &str, base_url: &Url, outline_budget: usize) -> PageSummary {
    let document = Html::parse_document(html);

    PageSummary {
        title: extract_title(html),
        meta: page_meta(&document),
        images: image_refs(&document, base_url),
        icons: icon_urls(&document, base_url),
        outline: outline::page_outline(html, base_url, outline_budget),
    }
}

fn page_meta(document: &Html) -> PageMeta {
    PageMeta {
        description: meta_content(document, r#"meta[name="description"]"#, "content"),
        viewport: meta_content(document, r#"meta[name="viewport"]"#, "content"),
        charset: meta_content(document, "meta[charset]", "charset"),
    }
}

fn meta_content(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn image_refs(document: &Html, base_url: &Url) -> Vec<ImageRef> {
    let selector = match Selector::parse("img[src]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut images = Vec::new();
    for img in document.select(&selector) {
        let Some(src) = img.value().attr("src") else {
            continue;
        };
        if src.starts_with("data:") {
            continue;
        }
        if let Ok(resolved) = base_url.join(src) {
            if images.iter().any(|i: &ImageRef| i.url == resolved) {
                continue;
            }
            images.push(ImageRef {
                url: resolved,
                alt: img.value().attr("alt").unwrap_or("").trim().to_string(),
            });
            if images.len() == MAX_SUMMARY_IMAGES {
                break;
            }
        }
    }
    images
}

fn icon_urls(document: &Html, base_url: &Url) -> Vec<Url> {
    let selector = match Selector::parse(r#"link[rel~="icon"], link[rel="apple-touch-icon"]"#) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut icons = Vec::new();
    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if let Ok(resolved) = base_url.join(href) {
            if !icons.contains(&resolved) {
                icons.push(resolved);
            }
        }
    }
    icons
}
