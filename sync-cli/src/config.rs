//! Configuration loading for relaysync.
//!
//! Configuration is loaded from a TOML file (default: `relaysync.toml`).
//! Every field has a default, so a missing default file is not an error.

use relaysync_client::ClientConfig;
use relaysync_types::Filter;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "relaysync.toml";

/// Root configuration for relaysync.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Connection timeouts.
    #[serde(default)]
    pub client: ClientSection,
    /// What to backfill and from where.
    #[serde(default)]
    pub backfill: BackfillConfig,
}

/// Connection timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSection {
    /// TCP + TLS + upgrade bound in seconds (default: 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Read poll interval in seconds (default: 30).
    #[serde(default = "default_read_poll_secs")]
    pub read_poll_secs: u64,
    /// NIP-05 request timeout in seconds (default: 10).
    #[serde(default = "default_nip05_timeout_secs")]
    pub nip05_timeout_secs: u64,
}

/// Backfill targets and filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackfillConfig {
    /// Relay URLs (`ws://` or `wss://`).
    #[serde(default)]
    pub relays: Vec<String>,
    /// npub, hex or NIP-05 identities whose events are fetched.
    #[serde(default)]
    pub identities: Vec<String>,
    /// Event kinds; empty means all kinds.
    #[serde(default)]
    pub kinds: Vec<u32>,
    /// Only events at or after this unix time.
    pub since: Option<i64>,
    /// Only events at or before this unix time.
    pub until: Option<i64>,
    /// Per-relay cap on stored events returned.
    pub limit: Option<u64>,
}

// Default value functions
fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_poll_secs() -> u64 {
    30
}

fn default_nip05_timeout_secs() -> u64 {
    10
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_poll_secs: default_read_poll_secs(),
            nip05_timeout_secs: default_nip05_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate().map_err(|field| ConfigError::ZeroTimeout {
            path: path.to_path_buf(),
            field,
        })?;
        Ok(config)
    }

    /// Every timeout must be non-zero; returns the offending field.
    fn validate(&self) -> Result<(), &'static str> {
        let timeouts = [
            ("client.connect_timeout_secs", self.client.connect_timeout_secs),
            ("client.read_poll_secs", self.client.read_poll_secs),
            ("client.nip05_timeout_secs", self.client.nip05_timeout_secs),
        ];
        match timeouts.into_iter().find(|(_, secs)| *secs == 0) {
            Some((field, _)) => Err(field),
            None => Ok(()),
        }
    }

    /// Load `explicit` if given, else the default file if it exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Library configuration derived from the `[client]` section.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_connect_timeout(Duration::from_secs(self.client.connect_timeout_secs))
            .with_read_poll_interval(Duration::from_secs(self.client.read_poll_secs))
            .with_nip05_timeout(Duration::from_secs(self.client.nip05_timeout_secs))
    }
}

impl BackfillConfig {
    /// The subscription filter for the given hex authors.
    pub fn filter(&self, authors: impl IntoIterator<Item = String>) -> Filter {
        let mut filter = Filter::new().authors(authors);
        if !self.kinds.is_empty() {
            filter = filter.kinds(self.kinds.iter().copied());
        }
        if let Some(since) = self.since {
            filter = filter.since(since);
        }
        if let Some(until) = self.until {
            filter = filter.until(until);
        }
        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }
        filter
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A timeout was set to zero.
    #[error("invalid config file {path}: {field} must be greater than zero")]
    ZeroTimeout {
        /// Path to the configuration file.
        path: PathBuf,
        /// The offending key.
        field: &'static str,
    },
}
