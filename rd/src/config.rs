//! reqdispatch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{Backoff, DEFAULT_RETRY_CODES};

/// Main reqdispatch configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Remote endpoint and protocol defaults
    pub client: ClientConfig,

    /// Retry policy
    pub retry: RetryConfig,

    /// Request pacing
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,

    /// Worker pool sizing
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.client.base_url.trim().is_empty() {
            return Err(eyre::eyre!("client.base-url must not be empty"));
        }
        if self.rate_limit.permits > 0 && self.rate_limit.window_ms == 0 {
            return Err(eyre::eyre!("rate-limit.window-ms must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .reqdispatch.yml
        let local_config = PathBuf::from(".reqdispatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/reqdispatch/reqdispatch.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("reqdispatch").join("reqdispatch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(p) => p.clone(),
            None => {
                let local = PathBuf::from(".reqdispatch.yml");
                if local.exists() {
                    local
                } else {
                    dirs::config_dir()?.join("reqdispatch").join("reqdispatch.yml")
                }
            }
        };
        let content = fs::read_to_string(path).ok()?;
        let config: Self = serde_yaml::from_str(&content).ok()?;
        config.log_level
    }

    pub(crate) fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Remote endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API base URL; method names are appended to it
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Protocol version stamped on every request (`v`)
    pub version: String,

    /// Response locale stamped on every request (`lang`)
    pub lang: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Environment variable containing the access token
    #[serde(rename = "token-env")]
    pub token_env: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.vk.com/method/".to_string(),
            version: "5.131".to_string(),
            lang: "en".to_string(),
            timeout_ms: 30_000,
            token_env: "VK_ACCESS_TOKEN".to_string(),
        }
    }
}

impl ClientConfig {
    /// Read the access token from the configured environment variable
    pub fn token_from_env(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per envelope, including the first
    pub attempts: u32,

    /// Base backoff delay in milliseconds
    #[serde(rename = "delay-ms")]
    pub delay_ms: u64,

    /// Upper bound on a single backoff delay
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Backoff shape
    pub backoff: Backoff,

    /// Random extra delay added to each backoff, up to this many milliseconds
    #[serde(rename = "jitter-ms")]
    pub jitter_ms: u64,

    /// Whether network/status failures consume further attempts
    #[serde(rename = "retry-transport-errors")]
    pub retry_transport_errors: bool,

    /// Remote error codes eligible for another attempt
    #[serde(rename = "retry-codes")]
    pub retry_codes: Vec<i64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff: Backoff::Exponential,
            jitter_ms: 0,
            retry_transport_errors: true,
            retry_codes: DEFAULT_RETRY_CODES.to_vec(),
        }
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Permits per window; 0 disables pacing
    pub permits: u32,

    /// Window length in milliseconds
    #[serde(rename = "window-ms")]
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            permits: 3,
            window_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    /// Get the window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Workers per batch (clamped to batch size, at least 1)
    pub concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { concurrency: 3 }
    }
}
