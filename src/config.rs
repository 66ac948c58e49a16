use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Provider and runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider_id: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub timeout_ms: u64,
    pub default_max_tokens: u32,
    pub cache_ttl_secs: u64,
    pub roster_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider_id: DEFAULT_PROVIDER.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.8,
            top_p: 1.0,
            timeout_ms: 60_000,
            default_max_tokens: 512,
            cache_ttl_secs: 300,
            roster_path: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Unset keys fall back to
    /// defaults; set-but-malformed values are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            provider_id: read("ROLEPLAY_PROVIDER").unwrap_or(defaults.provider_id),
            base_url: read("ROLEPLAY_API_BASE_URL").unwrap_or(defaults.base_url),
            api_key: read("ROLEPLAY_API_KEY").unwrap_or_default(),
            model: read("ROLEPLAY_MODEL").unwrap_or(defaults.model),
            temperature: parse_or(read("ROLEPLAY_TEMPERATURE"), "ROLEPLAY_TEMPERATURE", defaults.temperature)?,
            top_p: parse_or(read("ROLEPLAY_TOP_P"), "ROLEPLAY_TOP_P", defaults.top_p)?,
            timeout_ms: parse_or(read("ROLEPLAY_TIMEOUT_MS"), "ROLEPLAY_TIMEOUT_MS", defaults.timeout_ms)?,
            default_max_tokens: parse_or(
                read("ROLEPLAY_DEFAULT_MAX_TOKENS"),
                "ROLEPLAY_DEFAULT_MAX_TOKENS",
                defaults.default_max_tokens,
            )?,
            cache_ttl_secs: parse_or(
                read("ROLEPLAY_CACHE_TTL_SECS"),
                "ROLEPLAY_CACHE_TTL_SECS",
                defaults.cache_ttl_secs,
            )?,
            roster_path: read("ROLEPLAY_ROSTER_PATH").map(PathBuf::from),
        })
    }

    /// The HTTP client cannot work without a key; the core can.
    pub fn require_api_key(&self) -> Result<&str, AppError> {
        if self.api_key.is_empty() {
            return Err(AppError::Config("ROLEPLAY_API_KEY must be set".to_string()));
        }
        Ok(&self.api_key)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, AppError> {
    match raw {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, value))),
        None => Ok(default),
    }
}
