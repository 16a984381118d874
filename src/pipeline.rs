use std::time::Instant;

use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::extractor::extract_text_blocking;
use crate::fetcher::PageFetcher;
use crate::llm::GeminiClient;

/// Validate → fetch → extract → summarize, once per request.
///
/// Holds no per-request state; the only difference between two pipelines is
/// their configuration.
pub struct SummaryPipeline {
    fetcher: PageFetcher,
    summarizer: Option<GeminiClient>,
}

impl SummaryPipeline {
    pub fn new(config: &Config) -> Result<Self> {
        let fetcher = PageFetcher::new(config.fetch_timeout)?;
        let summarizer = match &config.gemini_api_key {
            Some(key) => Some(GeminiClient::new(
                &config.gemini_api_base,
                &config.gemini_model,
                key.clone(),
                config.summary_timeout,
            )?),
            None => None,
        };

        Ok(SummaryPipeline { fetcher, summarizer })
    }

    pub async fn run(&self, url: Option<&str>) -> Result<String> {
        let summarizer = self.summarizer.as_ref().ok_or_else(|| {
            tracing::error!("GEMINI_API_KEY is not set");
            AppError::Configuration("API key missing.".to_string())
        })?;

        let url = validate_url(url)?;

        let fetch_start = Instant::now();
        let html = self.fetcher.fetch(&url).await?;
        tracing::info!(%url, bytes = html.len(), elapsed = ?fetch_start.elapsed(), "page fetched");

        let text = extract_text_blocking(html, url.clone()).await?;
        tracing::debug!(chars = text.chars().count(), "extracted page text");

        let llm_start = Instant::now();
        let summary = summarizer.summarize(&text).await?;
        tracing::info!(%url, elapsed = ?llm_start.elapsed(), "summary generated");

        Ok(summary)
    }
}

fn validate_url(raw: Option<&str>) -> Result<Url> {
    let raw = raw.filter(|raw| !raw.is_empty()).ok_or(AppError::MissingUrl)?;
    Url::parse(raw).map_err(|_| AppError::InvalidUrlFormat)
}
