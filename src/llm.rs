use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const SUMMARY_INSTRUCTION: &str =
    "以下のウェブページ本文を50文字以内1行で要約してください。句点は付けない";
pub const BODY_SEPARATOR: &str = "\n---\nウェブページ本文:\n";

const MAX_OUTPUT_TOKENS: u32 = 120;
const TEMPERATURE: f32 = 0.4;
const TOP_P: f32 = 0.95;
const TOP_K: u32 = 40;
const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Client for Gemini's `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_base: &str, model: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(GeminiClient {
            client,
            endpoint: format!("{}/models/{}:generateContent", api_base.trim_end_matches('/'), model),
            api_key,
            timeout,
        })
    }

    /// Asks for a one-line summary of already extracted page text.
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let body = build_request(text);

        tracing::debug!(endpoint = %self.endpoint, chars = text.chars().count(), "sending generation request");

        let (status, raw) = match tokio::time::timeout(self.timeout, self.send(&body)).await {
            Ok(result) => result?,
            Err(_) => return Err(self.timed_out()),
        };

        if !status.is_success() {
            return Err(remote_error(status, &raw));
        }

        let parsed: GenerateResponse = serde_json::from_str(&raw).map_err(|e| {
            tracing::error!(error = %e, "Gemini returned an unparsable body");
            AppError::EmptySummary
        })?;

        interpret(parsed)
    }

    async fn send(&self, body: &GenerateRequest<'_>) -> Result<(StatusCode, String)> {
        let res = self
            .client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = res.status();
        let raw = res.text().await.map_err(|e| self.classify(e))?;
        Ok((status, raw))
    }

    fn classify(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            return self.timed_out();
        }
        // reqwest embeds the request URL, which carries the key.
        let err = err.without_url();
        tracing::error!(error = %err, "Gemini API request failed");
        AppError::SummarizeNetwork(err.to_string())
    }

    fn timed_out(&self) -> AppError {
        AppError::SummarizeTimeout(self.timeout.as_secs_f64())
    }
}

fn build_request(text: &str) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part { text: SUMMARY_INSTRUCTION },
                Part { text: BODY_SEPARATOR },
                Part { text },
            ],
        }],
        generation_config: GenerationConfig {
            max_output_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            top_k: TOP_K,
        },
        safety_settings: SAFETY_CATEGORIES
            .into_iter()
            .map(|category| SafetySetting { category, threshold: SAFETY_THRESHOLD })
            .collect(),
    }
}

fn remote_error(status: StatusCode, raw: &str) -> AppError {
    tracing::error!(status = status.as_u16(), body = %raw, "Gemini API error");

    let message = serde_json::from_str::<ErrorEnvelope>(raw)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("Gemini API request failed with status {}.", status.as_u16()));

    if status == StatusCode::TOO_MANY_REQUESTS {
        AppError::QuotaExceeded(message)
    } else {
        AppError::RemoteApi(message)
    }
}

fn interpret(response: GenerateResponse) -> Result<String> {
    let summary = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    if let Some(summary) = summary {
        return Ok(summary);
    }

    match response.prompt_feedback.and_then(|feedback| feedback.block_reason) {
        Some(reason) => {
            tracing::warn!(%reason, "Gemini blocked the content");
            Err(AppError::ContentBlocked(reason))
        }
        None => {
            tracing::error!("Gemini response did not contain summary text");
            Err(AppError::EmptySummary)
        }
    }
}
