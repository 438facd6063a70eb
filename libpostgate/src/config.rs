//! Configuration management for Postgate

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channels::{validate_channel_name, ChannelConfig};
use crate::error::{ConfigError, Result};

/// Bounds for the idempotency record lifetime, in minutes
pub const MIN_TTL_MINUTES: u64 = 1;
pub const MAX_TTL_MINUTES: u64 = 1440;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub idempotency: IdempotencyConfig,
    pub dispatch: DispatchConfig,
    pub content: ContentConfig,
    pub channels: BTreeMap<String, ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// How long a claimed or completed key is remembered
    pub ttl_minutes: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl_minutes: 10 }
    }
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound for a single adapter call, e.g. "30s"
    pub request_timeout: String,
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Fixed pause between attempts, e.g. "1s"
    pub retry_delay: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_timeout: "30s".to_string(),
            max_attempts: 3,
            retry_delay: "1s".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration("dispatch.request_timeout", &self.request_timeout)
    }

    pub fn retry_delay(&self) -> Result<Duration> {
        parse_duration("dispatch.retry_delay", &self.retry_delay)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Reduce HTML output to plain text instead of sanitizing it
    pub strip_all_html: bool,
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error: defaults are used, with environment
    /// overrides applied on top.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides()?;
            config.validate()?;
            return Ok(config);
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let mut config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.apply_env_overrides()?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            channels = config.channels.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from a TOML string, without environment overrides
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `POSTGATE_IDEMPOTENCY_TTL` and `POSTGATE_REQUEST_TIMEOUT`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(ttl) = std::env::var("POSTGATE_IDEMPOTENCY_TTL") {
            self.idempotency.ttl_minutes = ttl.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "POSTGATE_IDEMPOTENCY_TTL must be a whole number of minutes, got '{}'",
                    ttl
                ))
            })?;
        }

        if let Ok(timeout) = std::env::var("POSTGATE_REQUEST_TIMEOUT") {
            self.dispatch.request_timeout = timeout.trim().to_string();
        }

        Ok(())
    }

    /// Check value ranges and channel definitions
    pub fn validate(&self) -> Result<()> {
        let ttl = self.idempotency.ttl_minutes;
        if !(MIN_TTL_MINUTES..=MAX_TTL_MINUTES).contains(&ttl) {
            return Err(ConfigError::Invalid(format!(
                "idempotency.ttl_minutes must be between {} and {}, got {}",
                MIN_TTL_MINUTES, MAX_TTL_MINUTES, ttl
            ))
            .into());
        }

        if self.dispatch.request_timeout()?.is_zero() {
            return Err(ConfigError::Invalid(
                "dispatch.request_timeout must be greater than zero".to_string(),
            )
            .into());
        }
        self.dispatch.retry_delay()?;

        if self.dispatch.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.max_attempts must be at least 1".to_string(),
            )
            .into());
        }

        for (name, channel) in &self.channels {
            validate_channel_name(name)?;
            if channel.platform.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("channels.{}.platform", name)).into());
            }
        }

        Ok(())
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| {
        ConfigError::Invalid(format!("{} '{}' is not a valid duration: {}", field, value, e)).into()
    })
}

/// Resolve the configuration file path following XDG base directory conventions
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POSTGATE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("postgate").join("config.toml"))
}
