use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::rate_limit::{StoreFailurePolicy, WindowSpec};
use crate::upstream::DEFAULT_UPSTREAM_URL;

// Which handler variant serves POST /api/generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HandlerMode {
    Forward,  // call the text-to-image API and stream its answer back
    Fallback, // answer from the local image pool, never call upstream
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("--rate-limit must be at least 1")]
    ZeroLimit,

    #[error("--rate-window must be at least 1 second")]
    ZeroWindow,

    #[error("forward mode needs an upstream API key (--api-key or STABILITY_AI_API_KEY)")]
    MissingApiKey,
}

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "imagegen-gateway")]
#[command(about = "Rate-limited proxy for a text-to-image API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // forward (call upstream) or fallback (serve local images)
    #[arg(short, long, env = "GATEWAY_MODE", value_enum, default_value_t = HandlerMode::Forward)]
    pub mode: HandlerMode,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 5)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_WINDOW", default_value_t = 10)]
    pub rate_window: u64,

    // Redis URL for the shared counter store; in-memory store when unset
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    // Prefix for counter store keys
    #[arg(long, env = "RATE_LIMIT_PREFIX", default_value = "ratelimit")]
    pub key_prefix: String,

    // What to do when the counter store is unreachable
    #[arg(long, env = "ON_STORE_FAILURE", value_enum, default_value_t = StoreFailurePolicy::FailClosed)]
    pub on_store_failure: StoreFailurePolicy,

    // Text-to-image endpoint
    #[arg(long, env = "UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    // Upstream bearer credential
    #[arg(long, env = "STABILITY_AI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    // Upstream request timeout in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT", default_value_t = 60)]
    pub upstream_timeout: u64,

    // Answer OPTIONS preflights with 200 instead of 405
    #[arg(long, env = "ANSWER_PREFLIGHT")]
    pub answer_preflight: bool,

    // Take the client identity from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long, env = "TRUST_FORWARDED_FOR")]
    pub trust_forwarded_for: bool,

    // JSON array of base64 images replacing the built-in fallback pool
    #[arg(long, env = "FALLBACK_FILE")]
    pub fallback_file: Option<PathBuf>,

    // How often the in-memory store drops idle clients, in seconds
    #[arg(long, default_value_t = 30)]
    pub sweep_interval: u64,

    // Largest accepted request body
    #[arg(long, default_value_t = 64 * 1024)]
    pub max_body_bytes: usize,
}

impl Args {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if self.rate_window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.mode == HandlerMode::Forward
            && self.api_key.as_deref().is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            max_requests: self.rate_limit,
            window: Duration::from_secs(self.rate_window),
        }
    }
}
