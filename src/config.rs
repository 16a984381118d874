use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro-latest";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    /// `None` keeps the server up but fails every summary request.
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub fetch_timeout: Duration,
    pub summary_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            summary_timeout: DEFAULT_SUMMARY_TIMEOUT,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; summary requests will fail");
        }

        let gemini_api_base = env::var("GEMINI_API_BASE")
            .unwrap_or_else(|_| DEFAULT_GEMINI_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let gemini_model =
            env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port
            .parse::<u16>()
            .map_err(|e| AppError::Configuration(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::Configuration(format!("Invalid host address: {}", e)))?;

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            gemini_api_key,
            gemini_api_base,
            gemini_model,
            fetch_timeout: secs_from_env("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT)?,
            summary_timeout: secs_from_env("SUMMARY_TIMEOUT_SECS", DEFAULT_SUMMARY_TIMEOUT)?,
        })
    }
}

fn secs_from_env(name: &str, default: Duration) -> Result<Duration> {
    match env::var(name) {
        Ok(raw) => parse_secs(name, &raw),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(e.into()),
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| AppError::Configuration(format!("Invalid {}: {:?}", name, raw)))
}
