//! Queue and retry configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::queue::QueueError;

/// Main configuration, as read from `.taskqueue.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Concurrency-bounded queue defaults
    pub concurrency: ConcurrencyConfig,

    /// Frequency-bounded queue defaults
    pub frequency: FrequencyConfig,

    /// Retry defaults
    pub retry: RetryConfig,
}

impl Config {
    /// Check every limit before any queue is built
    pub fn validate(&self) -> Result<(), QueueError> {
        self.concurrency.validate()?;
        self.frequency.validate()
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .taskqueue.yml
        let local_config = PathBuf::from(".taskqueue.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/taskqueue/taskqueue.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskqueue").join("taskqueue.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Concurrency-bounded queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum tasks in flight
    pub concurrency: usize,

    /// Start dispatching immediately on construction
    pub autostart: bool,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            autostart: false,
        }
    }
}

impl ConcurrencyConfig {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.concurrency == 0 {
            return Err(QueueError::ZeroConcurrency);
        }
        Ok(())
    }
}

/// Frequency-bounded queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    /// Maximum task starts per window
    pub frequency: usize,

    /// Rolling window length in milliseconds
    #[serde(rename = "window-ms")]
    pub window_ms: u64,

    /// Start dispatching immediately on construction
    pub autostart: bool,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            frequency: 10,
            window_ms: 1000,
            autostart: false,
        }
    }
}

impl FrequencyConfig {
    /// Get the rate window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.frequency == 0 {
            return Err(QueueError::ZeroFrequency);
        }
        if self.window_ms == 0 {
            return Err(QueueError::ZeroWindow);
        }
        Ok(())
    }
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first one
    pub retries: u32,

    /// Base delay between attempts in milliseconds
    #[serde(rename = "delay-ms")]
    pub delay_ms: u64,

    /// Double the delay after every failed attempt
    pub exponential: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            delay_ms: 100,
            exponential: true,
        }
    }
}

impl RetryConfig {
    /// Total number of attempts, including the first
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Get the base delay as a Duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Delay to wait after the failed attempt with zero-based index `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.exponential {
            self.delay().saturating_mul(2u32.saturating_pow(attempt))
        } else {
            self.delay()
        }
    }
}
