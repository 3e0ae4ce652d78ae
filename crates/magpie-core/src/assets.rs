//! Asset fetching with bounded fan-out
//!
//! One fetch per unique URL, at most `max_asset_fetches` in flight.
//! A failing asset becomes an error marker keyed by its URL; it never
//! aborts the batch.

use std::collections::HashMap;

use futures::{stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info};

use url::Url;

use crate::{CloneConfig, CloneError, FetchedAsset, Result};

pub struct AssetFetcher {
    client: Client,
    max_concurrency: usize,
    max_bytes: usize,
}

impl AssetFetcher {
    pub fn new(config: &CloneConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.asset_timeout)
            .build()?;

        Ok(Self {
            client,
            max_concurrency: config.max_asset_fetches.max(1),
            max_bytes: config.max_asset_bytes,
        })
    }

    /// Fetch every unique URL, keyed back to its source URL.
    ///
    /// Completion order within the fan-out is unspecified; the returned map
    /// makes it immaterial.
    pub async fn fetch_all(&self, urls: &[Url]) -> HashMap<Url, FetchedAsset> {
        let mut unique: Vec<Url> = Vec::new();
        for url in urls {
            if !unique.contains(url) {
                unique.push(url.clone());
            }
        }

        debug!(count = unique.len(), "fetching assets");
        stream::iter(unique)
            .map(|url| async move {
                let asset = self.fetch_one(&url).await;
                (url, asset)
            })
            .buffer_unordered(self.max_concurrency)
            .collect::<HashMap<_, _>>()
            .await
    }

    async fn fetch_one(&self, url: &Url) -> FetchedAsset {
        let response = match self.client.get(url.as_str()).send().await {
            Ok(response) => response,
            Err(e) => return FetchedAsset::failed(url.clone(), e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            return FetchedAsset::failed(url.clone(), format!("HTTP {}", status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return FetchedAsset::failed(url.clone(), e.to_string()),
        };
        if bytes.len() > self.max_bytes {
            return FetchedAsset::failed(
                url.clone(),
                format!("response exceeds {} bytes", self.max_bytes),
            );
        }

        FetchedAsset::fetched(
            url.clone(),
            content_type,
            String::from_utf8_lossy(&bytes).into_owned(),
        )
    }

    /// Plain-HTTP page fetch for the reconstruction path (no browser).
    pub async fn fetch_page(&self, url: &Url) -> Result<String> {
        info!(%url, "fetching page over HTTP");
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| CloneError::Navigation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CloneError::Navigation(format!(
                "{} answered HTTP {}",
                url, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| CloneError::Navigation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> AssetFetcher {
        AssetFetcher::new(&CloneConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_all_mixed_outcomes() {
        let mut server = mockito::Server::new_async().await;
        let ok_mock = server
            .mock("GET", "/ok.css")
            .with_status(200)
            .with_header("content-type", "text/css")
            .with_body("body { margin: 0 }")
            .expect(1)
            .create_async()
            .await;
        let missing_mock = server
            .mock("GET", "/missing.css")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let ok_url = Url::parse(&format!("{}/ok.css", server.url())).unwrap();
        let missing_url = Url::parse(&format!("{}/missing.css", server.url())).unwrap();

        let assets = fetcher()
            .fetch_all(&[ok_url.clone(), missing_url.clone()])
            .await;

        let ok = &assets[&ok_url];
        assert!(ok.is_fetched());
        assert_eq!(ok.content_type.as_deref(), Some("text/css"));
        assert_eq!(ok.body.as_deref(), Some("body { margin: 0 }"));

        let missing = &assets[&missing_url];
        assert!(!missing.is_fetched());
        assert_eq!(missing.error.as_deref(), Some("HTTP 404 Not Found"));

        ok_mock.assert_async().await;
        missing_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_all_dedupes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/shared.css")
            .with_status(200)
            .with_body("a{}")
            .expect(1)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/shared.css", server.url())).unwrap();
        let assets = fetcher().fetch_all(&[url.clone(), url.clone()]).await;

        assert_eq!(assets.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_all_unreachable_host_is_marked() {
        // Port 1 on localhost refuses connections
        let url = Url::parse("http://127.0.0.1:1/style.css").unwrap();
        let assets = fetcher().fetch_all(&[url.clone()]).await;
        assert!(!assets[&url].is_fetched());
    }

    #[tokio::test]
    async fn test_fetch_page_non_2xx_is_navigation_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone")
            .with_status(500)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/gone", server.url())).unwrap();
        let result = fetcher().fetch_page(&url).await;
        assert!(matches!(result, Err(CloneError::Navigation(_))));
    }

    #[tokio::test]
    async fn test_fetch_page_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body("<html><body>hi</body></html>")
            .create_async()
            .await;

        let url = Url::parse(&server.url()).unwrap();
        let html = fetcher().fetch_page(&url).await.unwrap();
        assert!(html.contains("hi"));
    }
}
