use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::Error;

pub const DEFAULT_MOMENTS_ENDPOINT: &str = "https://bereal.devin.rest/v1/moments/latest";
pub const DEFAULT_BROADCAST_ENDPOINT: &str = "https://api.line.me/v2/bot/message/broadcast";
pub const DEFAULT_REGION: &str = "asia-east";

const CONFIG_PATH_VAR: &str = "BENOTIFIED_CONFIG";
const API_KEY_VAR: &str = "BEREAL_API_KEY";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poller: PollerOptions,
    pub line: LineOptions,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollerOptions {
    pub region: String,
    pub check_interval_secs: u64,
    pub timeout_secs: u64,
    pub endpoint: String,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            check_interval_secs: 5,
            timeout_secs: 10,
            endpoint: DEFAULT_MOMENTS_ENDPOINT.to_string(),
        }
    }
}

impl PollerOptions {
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LineOptions {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BROADCAST_ENDPOINT.to_string(),
            timeout_secs: 10,
        }
    }
}

impl LineOptions {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Loads the configuration from `$BENOTIFIED_CONFIG`, falling back to
    /// `<config dir>/benotified/config.toml`.
    ///
    /// A missing file in the config dir is not an error: every option has a
    /// default. A file named by `$BENOTIFIED_CONFIG` must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the override file is missing, or if the file
    /// cannot be read or parsed.
    pub fn load() -> Result<Config, Error> {
        Self::load_located(config_path())
    }

    fn load_located(location: Option<ConfigPath>) -> Result<Config, Error> {
        match location {
            Some(ConfigPath::Override(path)) => Self::load_from(path),
            Some(ConfigPath::Default(path)) if path.exists() => Self::load_from(path),
            _ => Ok(Config::default()),
        }
    }

    /// Loads the configuration from an explicit TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or holds invalid values.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.poller.region.is_empty() {
            return Err(Error::Config("poller.region must not be empty".to_string()));
        }
        if self.poller.check_interval_secs == 0 {
            return Err(Error::Config(
                "poller.check_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.poller.timeout_secs == 0 || self.line.timeout_secs == 0 {
            return Err(Error::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

enum ConfigPath {
    Override(PathBuf),
    Default(PathBuf),
}

fn config_path() -> Option<ConfigPath> {
    if let Ok(path) = dotenvy::var(CONFIG_PATH_VAR) {
        return Some(ConfigPath::Override(PathBuf::from(path)));
    }
    dirs::config_dir().map(|dir| ConfigPath::Default(dir.join("benotified").join("config.toml")))
}

/// Reads the moments API key from the environment (or `.env`).
///
/// # Errors
///
/// Returns an error if `BEREAL_API_KEY` is unset or empty.
pub fn api_key() -> Result<String, Error> {
    non_empty_var(API_KEY_VAR)
}

pub(crate) fn non_empty_var(name: &str) -> Result<String, Error> {
    let value = dotenvy::var(name)?;
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{name} environment variable is empty")));
    }
    Ok(value)
}
