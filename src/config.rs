use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::auth::Credential;

pub const CREDENTIAL_ENV: &str = "DASHBOARD_AUTH_KEY";
const APP_DIR: &str = "transit-dashboard";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no credential configured: set `auth_key` or DASHBOARD_AUTH_KEY")]
    MissingCredential,
    #[error("failed to read config file {0:?}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config file {0:?}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth_key: Option<String>,
    pub token_url: String,
    pub api_url: String,
    pub stop_gid: String,
    pub station_status_url: String,
    pub station_id: String,
    pub token_cache_path: PathBuf,
    pub background_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub full_refresh_threshold: u32,
    pub departures_per_direction: usize,
    pub poll_interval_secs: u64,
    pub ready_poll_interval_ms: u64,
    pub http_timeout_secs: u64,
    pub clock_format: String,
}

impl Default for Config {
    fn default() -> Self {
        let app_dir = app_dir();

        Self {
            auth_key: None,
            token_url: "https://ext-api.vasttrafik.se/token".to_string(),
            api_url: "https://ext-api.vasttrafik.se/".to_string(),
            stop_gid: "9021014004830000".to_string(),
            station_status_url: String::new(),
            station_id: String::new(),
            token_cache_path: app_dir.join("token.json"),
            background_path: None,
            output_dir: app_dir.join("frames"),
            width: 480,
            height: 800,
            full_refresh_threshold: 10,
            departures_per_direction: 2,
            poll_interval_secs: 60,
            ready_poll_interval_ms: 500,
            http_timeout_secs: 5,
            clock_format: "%H:%M".to_string(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        app_dir().join("config.toml")
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::from_toml(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The environment variable wins over the file.
    pub fn credential(&self) -> Result<Credential, ConfigError> {
        self.credential_from(std::env::var(CREDENTIAL_ENV).ok())
    }

    fn credential_from(&self, env_value: Option<String>) -> Result<Credential, ConfigError> {
        env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.auth_key.clone().filter(|v| !v.trim().is_empty()))
            .map(|v| Credential::new(v.trim()))
            .ok_or(ConfigError::MissingCredential)
    }

    pub fn token_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.token_url)
    }

    pub fn departures_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.api_url)?.join(&format!("pr/v4/stop-areas/{}/departures", self.stop_gid))
    }

    /// `None` when no bike-share station is configured.
    pub fn station_status_url(&self) -> Result<Option<Url>, url::ParseError> {
        if self.station_status_url.is_empty() || self.station_id.is_empty() {
            return Ok(None);
        }

        Url::parse(&self.station_status_url).map(Some)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}
