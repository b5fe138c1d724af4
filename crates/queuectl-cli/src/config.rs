//! queuectl configuration (JSON file)

use std::fs;
use std::path::Path;
use std::time::Duration;

use eyre::{Context, Result, bail};
use queuectl_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Keys accepted by `config set`.
pub const KEYS: [&str; 4] = [
    "max_retries",
    "backoff_base",
    "poll_interval_secs",
    "monitor_interval_secs",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default `max_retries` for newly enqueued jobs.
    pub max_retries: u32,

    /// Backoff delay is `backoff_base ^ attempts` seconds.
    pub backoff_base: f64,

    /// Worker sleep when the queue is empty.
    pub poll_interval_secs: u64,

    /// Retry monitor period.
    pub monitor_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: RetryPolicy::DEFAULT_BACKOFF_BASE,
            poll_interval_secs: 2,
            monitor_interval_secs: 1,
        }
    }
}

impl Config {
    /// Load from `path`; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .context(format!("Failed to parse config file {}", path.display()))?;
        config
            .validate()
            .context(format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content + "\n")
            .context(format!("Failed to write config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            bail!("max_retries must be at least 1");
        }
        RetryPolicy::new(self.backoff_base)?;
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }
        if self.monitor_interval_secs == 0 {
            bail!("monitor_interval_secs must be at least 1");
        }
        Ok(())
    }

    /// Update one key from its string form. The config is left unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "max_retries" => updated.max_retries = parse(key, value)?,
            "backoff_base" => updated.backoff_base = parse(key, value)?,
            "poll_interval_secs" => updated.poll_interval_secs = parse(key, value)?,
            "monitor_interval_secs" => updated.monitor_interval_secs = parse(key, value)?,
            _ => bail!("Unknown config key '{}' (expected one of: {})", key, KEYS.join(", ")),
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// `(key, value)` pairs for display.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("max_retries", self.max_retries.to_string()),
            ("backoff_base", self.backoff_base.to_string()),
            ("poll_interval_secs", self.poll_interval_secs.to_string()),
            ("monitor_interval_secs", self.monitor_interval_secs.to_string()),
        ]
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy::new(self.backoff_base)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| eyre::eyre!("Invalid value '{}' for {}", value, key))
}
