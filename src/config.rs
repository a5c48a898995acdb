//! Environment-driven configuration
//!
//! Loaded once at startup and passed by reference to the client; nothing
//! reads the environment after [`Config::from_env`] returns.

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const API_TOKEN_VAR: &str = "REPLICATE_API_TOKEN";
pub const MODEL_VAR: &str = "REPLICATE_MODEL";
pub const BASE_URL_VAR: &str = "REPLICATE_BASE_URL";
pub const OUTPUT_DIR_VAR: &str = "OUTPUT_DIR";
pub const TIMEOUT_VAR: &str = "REQUEST_TIMEOUT_SECS";
pub const MAX_ATTEMPTS_VAR: &str = "MAX_ATTEMPTS";
pub const BASE_DELAY_VAR: &str = "RETRY_BASE_DELAY_MS";
pub const MAX_DELAY_VAR: &str = "RETRY_MAX_DELAY_MS";
pub const POLL_INTERVAL_VAR: &str = "POLL_INTERVAL_MS";

pub const DEFAULT_MODEL: &str =
    "stability-ai/sdxl:39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b";
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com";
pub const DEFAULT_OUTPUT_DIR: &str = "generated_images";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub api_token: String,
    pub model: String,
    pub base_url: String,
    pub output_dir: PathBuf,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub poll_interval: Duration,
}

impl Config {
    /// Load from the process environment, after merging a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_token = get(API_TOKEN_VAR).ok_or(ConfigError::MissingVar(API_TOKEN_VAR))?;

        let timeout_secs = parse_var(&get, TIMEOUT_VAR, DEFAULT_TIMEOUT_SECS)?;
        let max_attempts = parse_var(&get, MAX_ATTEMPTS_VAR, DEFAULT_MAX_ATTEMPTS)?;
        require_positive(TIMEOUT_VAR, timeout_secs)?;
        require_positive(MAX_ATTEMPTS_VAR, u64::from(max_attempts))?;

        Ok(Self {
            api_token,
            model: get(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: get(BASE_URL_VAR)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            output_dir: get(OUTPUT_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            timeout: Duration::from_secs(timeout_secs),
            max_attempts,
            base_delay: Duration::from_millis(parse_var(
                &get,
                BASE_DELAY_VAR,
                DEFAULT_BASE_DELAY_MS,
            )?),
            max_delay: Duration::from_millis(parse_var(&get, MAX_DELAY_VAR, DEFAULT_MAX_DELAY_MS)?),
            poll_interval: Duration::from_millis(parse_var(
                &get,
                POLL_INTERVAL_VAR,
                DEFAULT_POLL_INTERVAL_MS,
            )?),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl AsRef<Path>) -> Self {
        self.output_dir = output_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_delay, self.max_delay)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_token", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("output_dir", &self.output_dir)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

fn parse_var<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}

fn require_positive(var: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
