//! Client settings loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use powerctl_core::backoff::DEFAULT_MAX_ATTEMPTS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Failure to load or validate a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("read {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Client settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL, e.g. http://127.0.0.1:8000
    pub base_url: String,
    /// Per-attempt budget for API calls.
    pub request_timeout_ms: u64,
    /// Budget for the `/health` probe (never retried).
    pub health_timeout_ms: u64,
    /// Attempts per logical call, first one included.
    pub max_attempts: u32,
    /// Period of background resource polling.
    pub poll_interval_ms: u64,
    /// Single-device endpoint, when one is configured.
    pub device: Option<DeviceConfig>,
}

/// The `[device]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Absolute URL or a path relative to `base_url`.
    pub endpoint: String,
    /// Value of `source` in turn-on commands.
    #[serde(default = "default_device_source")]
    pub source: String,
}

fn default_device_source() -> String {
    "powerctl".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_ms: 10_000,
            health_timeout_ms: 5_000,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval_ms: 30_000,
            device: None,
        }
    }
}

impl ClientConfig {
    /// Reads and validates a TOML file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: ClientConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.request_timeout_ms == 0 || self.health_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be non-zero".into()));
        }
        if let Some(device) = &self.device {
            if device.endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid("device.endpoint is empty".into()));
            }
        }
        Ok(())
    }

    /// Per-attempt budget for API calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Budget for the health probe.
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    /// Poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Retry budget for API calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
    }
}
