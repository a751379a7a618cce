use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::provider::ProviderId;

pub const DEFAULT_USER_AGENT: &str = "WhatWeather/1.0 github.com/ChrVage/WhatWeather";

pub const ENV_USER_AGENT: &str = "WHATWEATHER_USER_AGENT";
pub const ENV_OUTPUT_DIR: &str = "WHATWEATHER_OUTPUT_DIR";
pub const ENV_BARENTSWATCH_API_KEY: &str = "BARENTSWATCH_API_KEY";

/// Base URL for every provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub oceanforecast: String,
    pub locationforecast: String,
    pub textforecast: String,
    pub nowcast: String,
    pub tide: String,
    pub barentswatch: String,
    pub nominatim: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            oceanforecast: "https://api.met.no/weatherapi/oceanforecast/2.0/complete".into(),
            locationforecast: "https://api.met.no/weatherapi/locationforecast/2.0/compact".into(),
            textforecast: "https://api.met.no/weatherapi/textforecast/2.0/landoverview".into(),
            nowcast: "https://api.met.no/weatherapi/nowcast/2.0/complete".into(),
            tide: "https://api.sehavniva.no/tideapi.php".into(),
            barentswatch: "https://www.barentswatch.no/bwapi".into(),
            nominatim: "https://nominatim.openstreetmap.org".into(),
        }
    }
}

impl Endpoints {
    pub fn base_url(&self, id: ProviderId) -> &str {
        match id {
            ProviderId::OceanForecast => &self.oceanforecast,
            ProviderId::LocationForecast => &self.locationforecast,
            ProviderId::TextForecast => &self.textforecast,
            ProviderId::Nowcast => &self.nowcast,
            ProviderId::Tide => &self.tide,
            ProviderId::BarentsWatch => &self.barentswatch,
            ProviderId::Nominatim => &self.nominatim,
        }
    }
}

/// Process-wide settings, read once at startup and passed to every client.
///
/// Example TOML:
/// ```toml
/// user_agent = "MyApp/1.0 me@example.com"
/// output_dir = "outputs"
///
/// [endpoints]
/// nominatim = "https://nominatim.example.org"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identifying `User-Agent` (name and contact) sent on every request.
    pub user_agent: String,
    pub output_dir: PathBuf,
    pub timeout_secs: u64,
    /// The tide service is slow; it gets its own timeout.
    pub tide_timeout_secs: u64,
    /// Minimum gap between two Nominatim calls.
    pub nominatim_rate_limit_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barentswatch_api_key: Option<String>,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            output_dir: PathBuf::from("outputs"),
            timeout_secs: 10,
            tide_timeout_secs: 30,
            nominatim_rate_limit_ms: 1000,
            barentswatch_api_key: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Load config from the platform config directory, or defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    /// Load config from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config directory.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("no", "whatweather", "whatweather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Apply `WHATWEATHER_*` / `BARENTSWATCH_API_KEY` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(agent) = lookup(ENV_USER_AGENT).filter(|v| !v.trim().is_empty()) {
            self.user_agent = agent;
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR).filter(|v| !v.trim().is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(key) = lookup(ENV_BARENTSWATCH_API_KEY) {
            self.set_barentswatch_api_key(Some(key));
        }
    }

    /// Store or clear the BarentsWatch key; blank keys clear it.
    pub fn set_barentswatch_api_key(&mut self, key: Option<String>) {
        self.barentswatch_api_key = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
    }

    pub fn barentswatch_api_key(&self) -> Option<&str> {
        self.barentswatch_api_key.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn tide_timeout(&self) -> Duration {
        Duration::from_secs(self.tide_timeout_secs)
    }

    pub fn nominatim_rate_limit(&self) -> Duration {
        Duration::from_millis(self.nominatim_rate_limit_ms)
    }
}
