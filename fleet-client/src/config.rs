use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::ExpectedError;

pub const DEFAULT_API_URL: &str = "https://api.fleet-cloud.io";

const CONFIG_DIR_ENV: &str = "FLEET_CONFIG_DIR";
const API_URL_ENV: &str = "FLEET_API_URL";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    #[serde(default)]
    pub trust_invalid_server_cert: bool,
    #[serde(default = "default_true")]
    pub analytics_enabled: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ResolverConfig {
    /// Include `$select`/`$expand` options in the device cache key. Off by
    /// default: a narrow first lookup is then served to later, broader ones.
    #[serde(default)]
    pub selection_in_cache_key: bool,
}

const CONFIG_KEYS: [&str; 5] = [
    "api_url",
    "trust_invalid_server_cert",
    "analytics_enabled",
    "log_level",
    "resolver.selection_in_cache_key",
];

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => {
            let message = format!("{} expects true or false, got '{}'", key, value);
            Err(ExpectedError::new(message).into())
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            trust_invalid_server_cert: false,
            analytics_enabled: true,
            log_level: default_log_level(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config = Self::load_stored()?;
        Ok(config.with_api_url_override(std::env::var(API_URL_ENV).ok()))
    }

    /// The config file as written, without environment overrides.
    pub fn load_stored() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        debug!("Loading config from: {:?}", path);
        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let config_dir = path.parent().context("Failed to get config directory")?;

        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        info!("Config saved to: {:?}", path);
        Ok(())
    }

    /// Update one setting by its dotted key, as typed on the command line.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_url" => {
                if value.trim().is_empty() {
                    return Err(ExpectedError::new("api_url must not be empty").into());
                }
                self.api_url = value.trim().to_string();
            }
            "trust_invalid_server_cert" => self.trust_invalid_server_cert = parse_bool(key, value)?,
            "analytics_enabled" => self.analytics_enabled = parse_bool(key, value)?,
            "log_level" => self.log_level = value.trim().to_string(),
            "resolver.selection_in_cache_key" => {
                self.resolver.selection_in_cache_key = parse_bool(key, value)?
            }
            _ => {
                return Err(ExpectedError::new(format!(
                    "Unknown config key: {}\n\nKnown keys: {}",
                    key,
                    CONFIG_KEYS.join(", ")
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Remove every piece of local state, the stored token included.
    pub fn clear() -> Result<()> {
        let config_dir = Self::config_dir()?;
        if config_dir.exists() {
            std::fs::remove_dir_all(&config_dir).context("Failed to remove config directory")?;
            info!("Removed {:?}", config_dir);
        }
        Ok(())
    }

    fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            debug!("Using api url {} from {}", url, API_URL_ENV);
            self.api_url = url;
        }
        self
    }

    /// Host part of the api url, e.g. `api.fleet-cloud.io`.
    pub fn api_host(&self) -> &str {
        self.api_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
    }

    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("fleet"))
    }

    fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}
