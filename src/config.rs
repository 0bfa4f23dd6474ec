use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::safety::is_safe_url;

// Looked up in the working directory when no --config is given.
pub const DEFAULT_CONFIG_FILE: &str = "calcprobe.toml";
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_MOCK_BASE_URL: &str = "http://localhost:9090";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/*
Where the calculator lives and how long to wait for it.

Every key is optional in the TOML file:

base_url = "http://localhost:5000"
mock_base_url = "http://localhost:9090"
timeout_seconds = 2
ca_file = "certs/ca.pem"
*/
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub base_url: String,
    pub mock_base_url: String,
    pub timeout_seconds: u64,
    pub ca_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: DEFAULT_BASE_URL.to_string(),
            mock_base_url: DEFAULT_MOCK_BASE_URL.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            ca_file: None,
        }
    }
}

impl Config {
    pub fn from_toml(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    // Reads and parses a config file. The file must exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw, path)
    }

    /*
    Resolves the configuration the binary runs with.

    An explicit path must exist. Without one, calcprobe.toml is used if present and the
    built-in defaults otherwise.
    */
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    // Both base URLs must be configured and inside the allow-list. The timeout must be positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [("base_url", &self.base_url), ("mock_base_url", &self.mock_base_url)];
        for (key, value) in urls {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} is not configured", key)));
            }
            if !is_safe_url(value) {
                let message = format!("{} {:?} is not a permitted URL", key, value);
                return Err(ConfigError::Invalid(message));
            }
        }
        if self.timeout_seconds == 0 {
            let message = "timeout_seconds must be greater than zero";
            return Err(ConfigError::Invalid(message.to_string()));
        }
        Ok(())
    }
}
