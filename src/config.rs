//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::routes;

pub const ENV_BASE_URL: &str = "BANK_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "BANK_API_TIMEOUT_SECS";
pub const ENV_REFRESH_TIMEOUT_SECS: &str = "BANK_API_REFRESH_TIMEOUT_SECS";
pub const ENV_KEYRING_SERVICE: &str = "BANK_API_KEYRING_SERVICE";

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_KEYRING_SERVICE: &str = "com.bank.session";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_login_route() -> String {
    routes::LOGIN.to_string()
}

fn default_keyring_service() -> String {
    DEFAULT_KEYRING_SERVICE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend root; request paths are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Fixed timeout applied to every HTTP call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound on the refresh-token exchange. Queued requests wait at most this long.
    #[serde(default = "default_timeout_secs")]
    pub refresh_timeout_secs: u64,
    /// Where the navigator is sent once the session cannot be renewed.
    #[serde(default = "default_login_route")]
    pub login_route: String,
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_TIMEOUT_SECS,
            login_route: default_login_route(),
            keyring_service: default_keyring_service(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data)?;
        config.base_url()?;
        Ok(config)
    }

    /// Reads overrides from the environment on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let read_secs = |key: &'static str| -> Result<Option<u64>, ConfigError> {
            read(key)
                .map(|value| {
                    value
                        .parse::<u64>()
                        .ok()
                        .filter(|secs| *secs > 0)
                        .ok_or(ConfigError::Env { key, value })
                })
                .transpose()
        };

        let mut config = Self::default();
        if let Some(base_url) = read(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(secs) = read_secs(ENV_TIMEOUT_SECS)? {
            config.timeout_secs = secs;
        }
        if let Some(secs) = read_secs(ENV_REFRESH_TIMEOUT_SECS)? {
            config.refresh_timeout_secs = secs;
        }
        if let Some(service) = read(ENV_KEYRING_SERVICE) {
            config.keyring_service = service;
        }

        config.base_url()?;
        Ok(config)
    }

    /// Parsed base url; only http and https are accepted.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::BaseUrl {
            value: self.base_url.clone(),
            reason,
        };
        let url = Url::parse(self.base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!("unsupported scheme `{other}`"))),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}
