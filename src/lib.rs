pub mod api;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod llm;
pub mod pipeline;

use std::sync::Arc;
use config::Config;
use error::Result;
use pipeline::SummaryPipeline;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SummaryPipeline>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(AppState {
            pipeline: Arc::new(SummaryPipeline::new(config)?),
        })
    }
}
