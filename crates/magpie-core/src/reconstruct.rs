//! Model-based page reconstruction
//!
//! Sends a page summary to the Gemini `generateContent` API and expects a
//! complete standalone HTML document back. Transient rate-limit responses
//! are retried a bounded number of times; everything else surfaces as
//! `ExternalService`.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::extract::PageSummary;
use crate::{CloneConfig, CloneError, Result};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_VERSION: &str = "v1beta";
/// Model calls can take a while on large prompts.
const REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_AFTER_SECS: u64 = 2;

pub struct Reconstructor {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl Reconstructor {
    pub fn new(api_key: String, config: &CloneConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: config.model.clone(),
        })
    }

    /// Set the base URL (for testing only)
    #[cfg(test)]
    pub fn set_base_url(&mut self, url: String) {
        self.base_url = url;
    }

    /// Ask the model to reconstruct the summarized page as standalone HTML.
    pub async fn reconstruct(&self, url: &Url, summary: &PageSummary) -> Result<String> {
        info!(%url, model = %self.model, "reconstructing page");
        let raw = self.generate(&build_prompt(url, summary)).await?;
        let html = strip_code_fences(&raw);

        if html.is_empty() {
            return Err(CloneError::ExternalService(
                "model returned an empty response".to_string(),
            ));
        }
        if !html.starts_with('<') {
            return Err(CloneError::ExternalService(
                "model response is not an HTML document".to_string(),
            ));
        }
        Ok(html)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };
        let endpoint = format!(
            "{}/{}/models/{}:generateContent",
            self.base_url, API_VERSION, self.model
        );

        let mut attempts = 0;
        loop {
            let response = self
                .client
                .post(&endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(&request)
                .send()
                .await
                .map_err(|e| CloneError::ExternalService(format!("request failed: {}", e)))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                attempts += 1;
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

                if attempts <= MAX_RETRIES {
                    warn!(
                        "model API rate limited, retrying in {}s (attempt {}/{})",
                        retry_after, attempts, MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    continue;
                }
                return Err(CloneError::ExternalService(
                    "model API rate limit persisted after retries".to_string(),
                ));
            }

            let body = response
                .text()
                .await
                .map_err(|e| CloneError::ExternalService(e.to_string()))?;

            if status.is_success() {
                let parsed: GenerateContentResponse = serde_json::from_str(&body)
                    .map_err(|e| {
                        CloneError::ExternalService(format!("malformed model response: {}", e))
                    })?;
                return parsed.text().map(str::to_string).ok_or_else(|| {
                    CloneError::ExternalService("model response contained no content".to_string())
                });
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(CloneError::ExternalService(
                    "model API rejected the credential (check GEMINI_API_KEY)".to_string(),
                ));
            }

            debug!("model API error body: {}", truncate(&body, 200));
            return Err(CloneError::ExternalService(format!(
                "model API returned HTTP {}",
                status
            )));
        }
    }
}

fn build_prompt(url: &Url, summary: &PageSummary) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are reconstructing a web page as a single standalone HTML document.\n\
         Rules:\n\
         - Respond with HTML only: no commentary, no markdown fences.\n\
         - Produce a complete document with its CSS inline in one <style> block.\n\
         - Follow the structure and text of the outline below; keep the layout simple.\n\
         - Reference images and icons by the absolute URLs given.\n\n",
    );

    prompt.push_str(&format!("Page URL: {}\n", url));
    if let Some(title) = &summary.title {
        prompt.push_str(&format!("Title: {}\n", title));
    }
    if let Some(description) = &summary.meta.description {
        prompt.push_str(&format!("Description: {}\n", description));
    }
    if let Some(viewport) = &summary.meta.viewport {
        prompt.push_str(&format!("Viewport: {}\n", viewport));
    }
    if let Some(charset) = &summary.meta.charset {
        prompt.push_str(&format!("Charset: {}\n", charset));
    }

    if !summary.images.is_empty() {
        prompt.push_str("\nImages on the page:\n");
        for image in &summary.images {
            if image.alt.is_empty() {
                prompt.push_str(&format!("- {}\n", image.url));
            } else {
                prompt.push_str(&format!("- {} (alt: {})\n", image.url, image.alt));
            }
        }
    }
    if let Some(icon) = summary.icons.first() {
        prompt.push_str(&format!("\nFavicon: {}\n", icon));
    }

    prompt.push_str(&format!("\nPage outline:\n{}\n", summary.outline));
    prompt
}

/// Models often wrap HTML in a fenced code block despite instructions.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.strip_prefix("html").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim().to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

// ============================================================================
// Gemini wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Text of the first candidate's first part, if any.
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .and_then(|content| content.parts.first())
            .map(|part| part.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract;

    fn summary() -> PageSummary {
        let base = Url::parse("https://example.com/").unwrap();
        extract::summarize_page(
            "<html><head><title>Example</title></head><body><h1>Example</h1></body></html>",
            &base,
            4_000,
        )
    }

    fn reconstructor(server_url: String) -> Reconstructor {
        let mut reconstructor =
            Reconstructor::new("test-key".to_string(), &CloneConfig::default()).unwrap();
        reconstructor.set_base_url(server_url);
        reconstructor
    }

    fn target() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    fn success_body(text: &str) -> String {
        serde_json::json!({
            "candidates": [
                { "content": { "role": "model", "parts": [ { "text": text } ] } }
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_reconstruct_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(success_body("<!DOCTYPE html><html><body>ok</body></html>"))
            .expect(1)
            .create_async()
            .await;

        let html = reconstructor(server.url())
            .reconstruct(&target(), &summary())
            .await
            .unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reconstruct_strips_code_fences() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(success_body("```html\n<html><body>fenced</body></html>\n```"))
            .create_async()
            .await;

        let html = reconstructor(server.url())
            .reconstruct(&target(), &summary())
            .await
            .unwrap();
        assert_eq!(html, "<html><body>fenced</body></html>");
    }

    #[tokio::test]
    async fn test_reconstruct_empty_response_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{ "candidates": [] }"#)
            .create_async()
            .await;

        let result = reconstructor(server.url())
            .reconstruct(&target(), &summary())
            .await;
        assert!(matches!(result, Err(CloneError::ExternalService(_))));
    }

    #[tokio::test]
    async fn test_reconstruct_non_html_response_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(success_body("Sorry, I can't help with that."))
            .create_async()
            .await;

        let result = reconstructor(server.url())
            .reconstruct(&target(), &summary())
            .await;
        assert!(matches!(result, Err(CloneError::ExternalService(_))));
    }

    #[tokio::test]
    async fn test_auth_failure_is_external_service_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .with_body(r#"{ "error": { "message": "invalid key" } }"#)
            .create_async()
            .await;

        let result = reconstructor(server.url())
            .reconstruct(&target(), &summary())
            .await;
        match result {
            Err(CloneError::ExternalService(message)) => {
                assert!(message.contains("credential"));
            }
            other => panic!("expected ExternalService error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_retries_are_bounded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_header("retry-after", "0")
            .with_body(r#"{ "error": { "code": 429, "status": "RESOURCE_EXHAUSTED" } }"#)
            .expect(3)
            .create_async()
            .await;

        let result = reconstructor(server.url())
            .reconstruct(&target(), &summary())
            .await;
        assert!(matches!(result, Err(CloneError::ExternalService(_))));

        // Initial request plus MAX_RETRIES retries
        mock.assert_async().await;
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("<html></html>"), "<html></html>");
        assert_eq!(
            strip_code_fences("```html\n<html></html>\n```"),
            "<html></html>"
        );
        assert_eq!(strip_code_fences("```\n<p>x</p>\n```"), "<p>x</p>");
    }

    #[test]
    fn test_prompt_carries_page_facts() {
        let prompt = build_prompt(&target(), &summary());
        assert!(prompt.contains("Page URL: https://example.com/"));
        assert!(prompt.contains("Title: Example"));
        assert!(prompt.contains("# Example"));
    }
}
