use anyhow::{Context, Result};

use bluesky_client::ReauthStrategy;

use crate::pool::{DEFAULT_CONCURRENCY, DEFAULT_QUEUE_CAPACITY};

const DEFAULT_BLUESKY_URL: &str = "https://bsky.social";
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Bluesky
    pub bluesky_identifier: String,
    pub bluesky_password: String,
    pub bluesky_base_url: String,
    pub bluesky_reauth: ReauthStrategy,

    // Gemini
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,

    // Server
    pub host: String,
    pub port: u16,

    // Pool
    pub concurrency: usize,
    pub queue_capacity: usize,

    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            bluesky_identifier: required_env("BLUESKY_IDENTIFIER")?,
            bluesky_password: required_env("BLUESKY_PASSWORD")?,
            bluesky_base_url: env_or("BLUESKY_BASE_URL", DEFAULT_BLUESKY_URL),
            bluesky_reauth: parsed_env("BLUESKY_REAUTH", ReauthStrategy::default())?,
            gemini_api_key: required_env("GEMINI_API_KEY")?,
            gemini_base_url: env_or("GEMINI_BASE_URL", DEFAULT_GEMINI_URL),
            gemini_model: env_or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            host: env_or("WORKER_HOST", "0.0.0.0"),
            port: parsed_env("WORKER_PORT", 50052)?,
            concurrency: parsed_env("WORKER_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            queue_capacity: parsed_env("WORKER_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            http_timeout_secs: parsed_env("HTTP_TIMEOUT_SECS", 60)?,
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.chars().take(5).map(char::len_utf8).sum::<usize>();
            format!("{}...({} chars)", &val[..n], val.chars().count())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  BLUESKY_IDENTIFIER: {}", self.bluesky_identifier);
        tracing::info!("  BLUESKY_PASSWORD: {}", preview(&self.bluesky_password));
        tracing::info!("  BLUESKY_BASE_URL: {}", self.bluesky_base_url);
        tracing::info!("  BLUESKY_REAUTH: {:?}", self.bluesky_reauth);
        tracing::info!("  GEMINI_API_KEY: {}", preview(&self.gemini_api_key));
        tracing::info!("  GEMINI_MODEL: {}", self.gemini_model);
        tracing::info!(
            "  WORKER: {}:{} (concurrency {}, queue {})",
            self.host,
            self.port,
            self.concurrency,
            self.queue_capacity
        );
    }
}

fn required_env(key: &str) -> Result<String> {
    let value = std::env::var(key).with_context(|| format!("{key} environment variable is required"))?;
    if value.trim().is_empty() {
        anyhow::bail!("{key} environment variable is empty");
    }
    Ok(value)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
        _ => Ok(default),
    }
}
