use anyhow::{Context, Result, anyhow};
use chrono::TimeDelta;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::{
    delivery::RetryPolicy,
    geo::{DEFAULT_DISPLACEMENT_THRESHOLD_M, GeoRateLimiter},
    model::{Location, ScaleUnit},
    provider::ProviderId,
};

/// Upper bound for `[update] min_retry_interval_secs`.
pub const MAX_MIN_RETRY_INTERVAL_SECS: i64 = 86_400;

pub const DEFAULT_PORTAL_URL: &str = "http://jaredbiehler.github.io/weather-my-way/config/";

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// What the user selected: which conditions source, which scale, and the
/// device display toggles.
///
/// The hourly key is not part of the TOML file; it is loaded from the
/// key-value store at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSelection {
    pub provider: ProviderId,
    pub scale: ScaleUnit,
    pub debug: bool,
    pub battery: bool,
    #[serde(skip)]
    pub hourly_api_key: Option<String>,
}

impl Default for ServiceSelection {
    fn default() -> Self {
        Self {
            provider: ProviderId::Yahoo,
            scale: ScaleUnit::Fahrenheit,
            debug: false,
            battery: true,
            hourly_api_key: None,
        }
    }
}

impl ServiceSelection {
    pub fn hourly_enabled(&self) -> bool {
        self.hourly_api_key.is_some()
    }
}

/// Timing of the update gate and of the delivery retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateTiming {
    pub min_retry_interval_secs: i64,
    pub retry_wait_ms: u64,
    pub max_retries: u32,
    pub hourly_index_1: usize,
    pub hourly_index_2: usize,
    pub displacement_threshold_m: f64,
}

impl Default for UpdateTiming {
    fn default() -> Self {
        Self {
            min_retry_interval_secs: 60,
            retry_wait_ms: 1000,
            max_retries: 3,
            hourly_index_1: 2,
            hourly_index_2: 8,
            displacement_threshold_m: DEFAULT_DISPLACEMENT_THRESHOLD_M,
        }
    }
}

impl UpdateTiming {
    /// Cooldown of the update gate, range-checked.
    pub fn min_retry_interval(&self) -> Result<TimeDelta> {
        let secs = self.min_retry_interval_secs;
        if !(0..=MAX_MIN_RETRY_INTERVAL_SECS).contains(&secs) {
            return Err(anyhow!(
                "min_retry_interval_secs must be between 0 and {}, got {secs}",
                MAX_MIN_RETRY_INTERVAL_SECS
            ));
        }
        TimeDelta::try_seconds(secs)
            .ok_or_else(|| anyhow!("min_retry_interval_secs out of range: {secs}"))
    }

    pub fn validate(&self) -> Result<()> {
        self.min_retry_interval()?;
        let threshold = self.displacement_threshold_m;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(anyhow!(
                "displacement_threshold_m must be a non-negative number, got {threshold}"
            ));
        }
        Ok(())
    }

    pub fn rate_limiter(&self) -> GeoRateLimiter {
        match self.min_retry_interval() {
            Ok(interval) => GeoRateLimiter::new(interval, self.displacement_threshold_m),
            Err(e) => {
                tracing::warn!(error = %e, "invalid update timing, using the default gate");
                GeoRateLimiter::default()
            }
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_wait_ms))
    }
}

/// Upstream base URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub yahoo: String,
    pub openweather: String,
    pub underground: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            yahoo: "https://query.yahooapis.com/v1/public/yql".to_string(),
            openweather: "http://api.openweathermap.org/data/2.5/weather".to_string(),
            underground: "http://api.wunderground.com".to_string(),
        }
    }
}

/// Optional mirroring of every delivered payload to an external endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diagnostics {
    pub enabled: bool,
    pub url: Option<String>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings page opened by the configuration portal.
    pub portal_url: String,

    pub service: ServiceSelection,
    pub update: UpdateTiming,

    /// Used when no position fix is available.
    pub home: Option<Location>,

    pub endpoints: Endpoints,
    pub diagnostics: Diagnostics,

    /// Example TOML:
    /// [providers.open]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            service: ServiceSelection::default(),
            update: UpdateTiming::default(),
            home: None,
            endpoints: Endpoints::default(),
            diagnostics: Diagnostics::default(),
            providers: HashMap::new(),
        }
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.update
            .validate()
            .with_context(|| format!("Invalid [update] section in {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
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

    pub fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "skycast", "skycast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Set/replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderConfig { api_key });
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }
}
