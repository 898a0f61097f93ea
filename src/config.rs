use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::path::Path;
use validator::Validate;

use crate::domain::SensorKind;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub home_assistant: HomeAssistantConfig,
    #[validate(nested)]
    pub sensors: SensorsConfig,
    #[validate(nested)]
    pub forecast: ForecastConfig,
    #[validate(nested)]
    pub battery: BatteryConfig,
    #[validate(nested)]
    pub prices: PricesConfig,
    #[serde(default)]
    pub advisor: AdvisorConfig,
    #[serde(default)]
    pub charging: ChargingConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HomeAssistantConfig {
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SensorsConfig {
    /// Entity ID of the battery state-of-charge sensor
    #[validate(length(min = 1))]
    pub soc: String,
    /// History window fed into the trend fit
    #[validate(range(min = 10))]
    pub history_minutes: i64,
    /// Solar production forecast sensors, empty when none installed
    #[serde(default)]
    pub solar: Vec<String>,
    /// Power consumption sensors, empty when none installed
    #[serde(default)]
    pub power: Vec<PowerSensorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PowerSensorConfig {
    pub entity: String,
    pub kind: SensorKind,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForecastConfig {
    #[validate(range(min = 0.0, max = 100.0))]
    pub threshold_percent: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BatteryConfig {
    #[validate(range(min = 0.1))]
    pub capacity_kwh: f64,
    #[validate(range(min = 0.1))]
    pub max_charge_kw: f64,
    #[serde(default = "default_target_soc")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub target_soc: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PricesConfig {
    #[validate(url)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_price_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorConfig {
    /// Advisor is disabled when no key is configured
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_advisor_model")]
    pub model: String,
    #[serde(default = "default_advisor_base_url")]
    pub base_url: String,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_advisor_model(),
            base_url: default_advisor_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub allow_multiple_periods: bool,
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_multiple_periods: true,
        }
    }
}

fn default_target_soc() -> f64 {
    100.0
}

fn default_price_timeout_seconds() -> u64 {
    30
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_advisor_model() -> String {
    crate::advisor::DEFAULT_MODEL.to_string()
}

fn default_advisor_base_url() -> String {
    crate::advisor::DEFAULT_BASE_URL.to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("BCP__").split("__"));
        let config: Self = figment
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}
