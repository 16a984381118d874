use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use url::Url;

use crate::error::{AppError, Result};

/// Crawler-style identity; some sites only serve full markup to known bots.
pub const USER_AGENT: &str =
    "URLSummarizerBot/1.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

const SNIPPET_CHARS: usize = 200;

/// Single-attempt page download bounded by a wall-clock timeout.
pub struct PageFetcher {
    client: Client,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(PageFetcher { client, timeout })
    }

    /// Returns the response body as text regardless of its content type.
    pub async fn fetch(&self, url: &Url) -> Result<String> {
        // The bound covers both the request and reading the body.
        match tokio::time::timeout(self.timeout, self.fetch_body(url)).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out()),
        }
    }

    async fn fetch_body(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let snippet = match response.text().await {
                Ok(body) if !body.is_empty() => snippet(&body),
                _ => status.canonical_reason().unwrap_or_default().to_string(),
            };
            tracing::warn!(%url, status = status.as_u16(), "page responded with an error status");
            return Err(AppError::FetchHttp { status: status.as_u16(), snippet });
        }

        response.text().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            self.timed_out()
        } else {
            AppError::FetchNetwork(err.to_string())
        }
    }

    fn timed_out(&self) -> AppError {
        AppError::FetchTimeout(self.timeout.as_secs_f64())
    }
}

/// First 200 characters of an error page, with `...` when cut short.
fn snippet(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
