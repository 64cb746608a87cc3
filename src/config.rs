use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

use crate::mta::feeds;

/// Top-level configuration file structure.
#[derive(Debug, Deserialize)]
struct RawConfig {
    feeds: RawFeedConfig,
    #[serde(default)]
    refresh: RefreshConfig,
    #[serde(default)]
    web: RawWebConfig,
}

#[derive(Debug, Deserialize)]
struct RawFeedConfig {
    #[serde(default)]
    routes: Vec<String>,
    /// Extra feed URLs fetched as-is.
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWebConfig {
    bind: Option<String>,
}

/// Refresh intervals (optional in config file).
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_trains_interval")]
    pub trains_interval: u64,
}

fn default_trains_interval() -> u64 {
    30
}

const DEFAULT_BIND: &str = "0.0.0.0:5001";

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            trains_interval: default_trains_interval(),
        }
    }
}

/// Resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub routes: Vec<String>,
    /// Deduplicated feed URLs covering `routes`, plus any explicit URLs.
    pub feed_urls: Vec<String>,
    pub refresh: RefreshConfig,
    pub bind: SocketAddr,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse config from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;

        let (mut feed_urls, unknown) = feeds::feed_urls_for_routes(&raw.feeds.routes);
        if let Some(route) = unknown.into_iter().next() {
            return Err(ConfigError::UnknownRoute(route));
        }
        for url in raw.feeds.urls {
            if !feed_urls.contains(&url) {
                feed_urls.push(url);
            }
        }

        let bind_str = raw.web.bind.as_deref().unwrap_or(DEFAULT_BIND);
        let bind: SocketAddr = bind_str.parse().map_err(|_| {
            ConfigError::Validation(format!("web.bind is not a socket address: {}", bind_str))
        })?;

        let config = Config {
            routes: raw.feeds.routes,
            feed_urls,
            refresh: raw.refresh,
            bind,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate config values are within acceptable ranges.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(5..=600).contains(&self.refresh.trains_interval) {
            return Err(ConfigError::Validation(format!(
                "trains_interval must be 5-600 seconds, got {}",
                self.refresh.trains_interval
            )));
        }
        if self.routes.is_empty() {
            return Err(ConfigError::Validation(
                "routes cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Route '{0}' has no known MTA feed")]
    UnknownRoute(String),
}
