//! Configuration file and state directory layout.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::invoker::DEFAULT_API_URL;
use crate::stream::{DEFAULT_STALL_TIMEOUT, DEFAULT_STREAM_URL};

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config field `{0}` is missing or empty")]
    MissingField(&'static str),

    #[error("cannot create state directory {}: {source}", path.display())]
    StateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Consumer key and secret of the registered application.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub oauth: OAuthConfig,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
}

fn default_stream_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_stall_timeout_secs() -> u64 {
    DEFAULT_STALL_TIMEOUT.as_secs()
}

impl Config {
    /// Reads and validates a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str::<Config>(&text)
            .map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
            .validated()
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str::<Config>(text)
            .map_err(|source| ConfigError::Yaml {
                path: PathBuf::from("<inline>"),
                source,
            })?
            .validated()
    }

    fn validated(self) -> Result<Self> {
        if self.oauth.key.trim().is_empty() {
            return Err(ConfigError::MissingField("oauth.key"));
        }
        if self.oauth.secret.trim().is_empty() {
            return Err(ConfigError::MissingField("oauth.secret"));
        }
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::MissingField("keywords"));
        }
        if self.stall_timeout_secs == 0 {
            return Err(ConfigError::MissingField("stall_timeout_secs"));
        }
        Ok(self)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

/// Paths under the state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    pub archive: PathBuf,
    pub queue: PathBuf,
    pub oauth: PathBuf,
}

impl StateLayout {
    pub fn new(state_dir: &Path) -> Self {
        StateLayout {
            archive: state_dir.join("archive"),
            queue: state_dir.join("queue"),
            oauth: state_dir.join(".oauth"),
        }
    }

    /// Creates the archive and queue directories if they are absent.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.archive, &self.queue] {
            fs::create_dir_all(dir).map_err(|source| ConfigError::StateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
