use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::api::endpoints;
use crate::regions::RegionConfig;

const CONFIG_FILE: &str = "eia-weather.toml";
const CONFIG_ENV: &str = "EIA_WEATHER_CONFIG";

/// EIA v2 API settings
#[derive(Debug, Clone, Deserialize)]
pub struct EiaConfig {
    #[serde(default = "default_eia_url")]
    pub base_url: String,
    /// Overridden by the EIA_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,
    /// Rows per page; the API caps this at 5000
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for EiaConfig {
    fn default() -> Self {
        Self {
            base_url: default_eia_url(),
            api_key: None,
            page_size: default_page_size(),
        }
    }
}

/// Open-Meteo request settings used by the collector
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default = "default_variables")]
    pub variables: Vec<String>,
    #[serde(default = "default_past_days")]
    pub past_days: u32,
    #[serde(default)]
    pub forecast_days: u32,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_url(),
            variables: default_variables(),
            past_days: default_past_days(),
            forecast_days: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Extra attempts after a transport failure (connect, timeout)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay; doubles on each further attempt
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub eia: EiaConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Extra or replacement regions, keyed like the built-in ones
    #[serde(default)]
    pub regions: BTreeMap<String, RegionConfig>,
}

fn default_eia_url() -> String { endpoints::EIA_API.to_string() }
fn default_page_size() -> usize { 5000 }
fn default_weather_url() -> String { endpoints::OPEN_METEO_FORECAST.to_string() }
fn default_variables() -> Vec<String> {
    vec!["temperature_2m", "relative_humidity_2m", "wind_speed_10m", "shortwave_radiation"]
        .into_iter().map(String::from).collect()
}
fn default_past_days() -> u32 { 7 }
fn default_user_agent() -> String { format!("eia-weather/{}", env!("CARGO_PKG_VERSION")) }
fn default_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 2 }
fn default_retry_backoff() -> u64 { 500 }

impl AppConfig {
    /// Load from `$EIA_WEATHER_CONFIG` or `eia-weather.toml`, then apply `EIA_API_KEY`.
    /// A missing default file means built-in defaults; a missing explicit file is an error.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load_from(Path::new(&path))?,
            Err(_) => {
                let path = Path::new(CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(key) = std::env::var("EIA_API_KEY") {
            if !key.trim().is_empty() {
                config.eia.api_key = Some(key.trim().to_string());
            }
        }

        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&data).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(data)?;
        if config.eia.page_size == 0 || config.eia.page_size > 5000 {
            anyhow::bail!("eia.page_size must be between 1 and 5000, got {}", config.eia.page_size);
        }
        Ok(config)
    }
}
