//! Runtime configuration
//!
//! Read once when a node starts.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Environment variables (TORC_WORKERS, OMP_NUM_THREADS, TORC_YIELDTIME, ...)
//! 2. RON document (optional)
//! 3. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use torc::util::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_ron_str("(workers: 4)").unwrap();
//! assert_eq!(config.workers, 4);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on workers per node.
pub const MAX_WORKERS: usize = 64;

/// Per-node runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads on this node, including the calling thread.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Sleep between empty scheduler polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Sleep after a "no work" steal reply, in milliseconds.
    #[serde(default = "default_steal_backoff_ms")]
    pub steal_backoff_ms: u64,
    /// Stealing throttling factor. Read and reported only.
    #[serde(default)]
    pub throttling_factor: Option<u32>,
    /// Initial inter-node stealing flag.
    #[serde(default)]
    pub stealing: bool,
    /// Exit the process once shutdown completes.
    #[serde(default = "default_exit_on_shutdown")]
    pub exit_on_shutdown: bool,
    /// Log per-node statistics at shutdown.
    #[serde(default = "default_stats")]
    pub stats: bool,
}

fn default_workers() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_steal_backoff_ms() -> u64 {
    100
}

fn default_exit_on_shutdown() -> bool {
    true
}

fn default_stats() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            steal_backoff_ms: default_steal_backoff_ms(),
            throttling_factor: None,
            stealing: false,
            exit_on_shutdown: default_exit_on_shutdown(),
            stats: default_stats(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a RON document; missing fields keep their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(ConfigError::Parse)
    }

    /// Load defaults, then the optional RON file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_ron_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay process environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay variables from `lookup`.
    ///
    /// Numeric variables are only taken when they parse to a positive value;
    /// anything else is ignored.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) {
        let positive = |key: &str| -> Option<u64> {
            lookup(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|value| *value > 0)
        };

        if let Some(value) = positive("OMP_NUM_THREADS") {
            self.workers = value as usize;
        }
        if let Some(value) = positive("TORC_WORKERS") {
            self.workers = value as usize;
        }
        if let Some(value) = positive("TORC_YIELDTIME") {
            self.poll_interval_ms = value;
        }
        if let Some(value) = positive("TORC_THROTTLING_FACTOR") {
            self.throttling_factor = Some(value as u32);
        }
        if let Some(flag) = lookup("TORC_STEALING").and_then(|v| parse_flag(&v)) {
            self.stealing = flag;
        }
        if let Some(flag) = lookup("TORC_STATS").and_then(|v| parse_flag(&v)) {
            self.stats = flag;
        }
    }

    /// Check bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkers(self.workers));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_ms",
                value: 0,
            });
        }
        Ok(())
    }

    /// Poll interval as a duration.
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Steal backoff as a duration.
    #[inline]
    pub fn steal_backoff(&self) -> Duration {
        Duration::from_millis(self.steal_backoff_ms)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("cannot read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The RON document is malformed.
    #[error("config parse error: {0}")]
    Parse(#[source] ron::error::SpannedError),

    /// Worker count outside `1..=MAX_WORKERS`.
    #[error("invalid worker count {0} (expected 1..={max})", max = MAX_WORKERS)]
    InvalidWorkers(usize),

    /// A field holds an unusable value.
    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u64 },
}
