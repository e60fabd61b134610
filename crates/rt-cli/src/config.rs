use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use rt_store::LockConfig;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtConfig {
    /// Pool used when `-p` is not given.
    pub pool: Option<String>,
    pub store: StoreConfig,
    pub retry: RetryConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
    /// Create the pool on first use instead of failing.
    pub create_pools: bool,
    pub lock_attempts: u32,
    pub lock_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./rt-data"),
            create_pools: true,
            lock_attempts: 200,
            lock_delay_ms: 5,
        }
    }
}

impl StoreConfig {
    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            attempts: self.lock_attempts.max(1),
            delay: Duration::from_millis(self.lock_delay_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 10,
            max_backoff_ms: 1_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier.max(1.0),
            jitter: self.jitter,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

impl LogConfig {
    pub fn max_level(&self, verbose: bool) -> anyhow::Result<tracing::Level> {
        if verbose {
            return Ok(tracing::Level::DEBUG);
        }
        self.level
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid log level '{}'", self.level))
    }
}

impl RtConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid config")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Load `path` if given, otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}
