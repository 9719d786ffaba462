//! Pool configuration loading
//!
//! Config precedence for the file path: CLI arg > `DATA_SERVICE_CONFIG` env var >
//! `data-service.toml` in the working directory. The file carries the pool's
//! defaults; nothing is read from ambient global state after loading.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tracing::warn;

use crate::pool::Defaults;

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Prefix joined onto every route. Empty means routes are full URLs.
    #[serde(default)]
    pub base_url: String,
    /// Idle timeout before an operation is cancelled. 0 evicts immediately.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,
}

/// Default header sent with every request unless overridden per call
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: default_timeout_ms(),
            headers: Vec::new(),
        }
    }
}

impl PoolConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> common::Result<Self> {
        let config: PoolConfig = toml::from_str(contents)?;

        if !config.base_url.is_empty()
            && !config.base_url.starts_with("http://")
            && !config.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.base_url
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or DATA_SERVICE_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("DATA_SERVICE_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("data-service.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Convert into pool defaults. Invalid header entries are skipped with a warning.
    pub fn defaults(&self) -> Defaults {
        Defaults {
            base_url: self.base_url.clone(),
            headers: header_map(&self.headers),
            timeout: self.timeout(),
        }
    }
}

/// Build a header map from name/value pairs, skipping entries that are not valid HTTP headers.
pub fn header_map(entries: &[HeaderEntry]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for entry in entries {
        let name = match HeaderName::from_str(&entry.name) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %entry.name, error = %e, "skipping invalid header name");
                continue;
            }
        };
        let value = match HeaderValue::from_str(&entry.value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = %entry.name, error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(name, value);
    }
    headers
}
