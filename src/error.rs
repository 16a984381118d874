use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::api::response;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Method {0} Not Allowed")]
    MethodNotAllowed(String),

    #[error("Invalid JSON in request body")]
    InvalidBody,

    #[error("URL is required")]
    MissingUrl,

    #[error("Invalid URL format")]
    InvalidUrlFormat,

    #[error("Request timed out while fetching the URL ({0}s limit).")]
    FetchTimeout(f64),

    #[error("Failed to fetch content from URL: Failed to fetch URL: {status} {snippet}")]
    FetchHttp { status: u16, snippet: String },

    #[error("Failed to fetch content from URL: {0}")]
    FetchNetwork(String),

    #[error("Could not extract readable content. The page might be empty or non-textual.")]
    NoExtractableContent,

    #[error("Failed to process content from the page after fetching.")]
    ExtractionProcessing(String),

    #[error("Gemini API request timed out ({0}s limit).")]
    SummarizeTimeout(f64),

    #[error("Gemini API quota exceeded or rate limited. Details: {0}")]
    QuotaExceeded(String),

    #[error("Gemini API error: {0}")]
    RemoteApi(String),

    #[error("Failed to communicate with Gemini API.")]
    SummarizeNetwork(String),

    #[error("Summary generation blocked due to: {0}. The content might violate safety policies.")]
    ContentBlocked(String),

    #[error("Failed to get a valid summary from Gemini. Response was empty or malformed.")]
    EmptySummary,

    #[error("Server configuration error: {0}")]
    Configuration(String),

    #[error("An unexpected server error occurred. Please try again later.")]
    Unexpected(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::InvalidBody
            | AppError::MissingUrl
            | AppError::InvalidUrlFormat
            | AppError::ContentBlocked(_) => StatusCode::BAD_REQUEST,
            AppError::FetchTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::SummarizeTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::QuotaExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::FetchHttp { .. }
            | AppError::FetchNetwork(_)
            | AppError::NoExtractableContent
            | AppError::ExtractionProcessing(_)
            | AppError::RemoteApi(_)
            | AppError::SummarizeNetwork(_)
            | AppError::EmptySummary
            | AppError::Configuration(_)
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut res = response::error(status, self.to_string());

        if let AppError::MethodNotAllowed(_) = self {
            res.headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST"));
        }

        res
    }
}

impl From<std::env::VarError> for AppError {
    fn from(err: std::env::VarError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
