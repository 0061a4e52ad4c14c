use anyhow::{ensure, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub data: DataConfig,
    pub models: ModelsConfig,
    pub demand: DemandConfig,
    pub features: FeaturesConfig,
    pub pricing: PricingConfig,
    pub maintenance: MaintenanceConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
    pub enable_cors: bool,
    pub cors_allowed_origins: Vec<String>,
}
impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    Simulated,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub source: DataSourceKind,
    /// JSON dataset, only read when `source = "file"`
    pub path: PathBuf,
    /// Days of history fetched ahead of a demand prediction window
    pub history_days: i64,
    /// Days of port telemetry used by the maintenance predictor
    pub telemetry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub model_path: Option<PathBuf>,
    pub train_on_startup: bool,
    pub training_station_id: String,
    pub training_window_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemandConfig {
    pub max_horizon_hours: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    /// Fixed-date holidays as "MM-DD"
    pub holidays: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    pub default_elasticity: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub competitor_sensitivity: f64,
    pub peak_hours: Vec<u32>,
    pub peak_premium: f64,
    pub off_peak_discount: f64,
    pub weekend_discount: f64,
    pub min_history: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    pub min_history: usize,
    pub temperature_limit_c: f64,
    pub voltage_nominal_v: f64,
    pub voltage_tolerance: f64,
    pub error_limit: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    pub insights_window_days: i64,
    pub underutilized_percent: f64,
    /// Longest report period accepted by `/analytics/generate`
    pub max_period_days: i64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("EVA__").split("__"));
        let cfg: Self = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build a config from TOML text without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let cfg: Self = Figment::new().merge(Toml::string(toml)).extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the predictors cannot operate with
    pub fn validate(&self) -> Result<()> {
        let p = &self.pricing;
        ensure!(
            p.min_price.is_finite() && p.max_price.is_finite() && p.min_price > 0.0,
            "pricing.min_price and pricing.max_price must be finite and positive"
        );
        ensure!(
            p.min_price < p.max_price,
            "pricing.min_price ({}) must be below pricing.max_price ({})",
            p.min_price,
            p.max_price
        );
        ensure!(
            p.default_elasticity.is_finite() && p.default_elasticity < 0.0,
            "pricing.default_elasticity must be negative, got {}",
            p.default_elasticity
        );
        ensure!(p.min_history >= 2, "pricing.min_history must be at least 2");
        ensure!(
            p.peak_premium.is_finite() && p.peak_premium >= 0.0,
            "pricing.peak_premium must be non-negative"
        );
        for (name, value) in [
            ("off_peak_discount", p.off_peak_discount),
            ("weekend_discount", p.weekend_discount),
        ] {
            ensure!(
                (0.0..1.0).contains(&value),
                "pricing.{name} must be in [0, 1), got {value}"
            );
        }
        ensure!(
            p.peak_hours.iter().all(|h| *h < 24),
            "pricing.peak_hours must be hours of day (0-23)"
        );

        let m = &self.maintenance;
        ensure!(m.min_history >= 2, "maintenance.min_history must be at least 2");
        ensure!(
            m.voltage_tolerance > 0.0 && m.voltage_nominal_v > 0.0,
            "maintenance.voltage_nominal_v and voltage_tolerance must be positive"
        );
        ensure!(m.error_limit > 0.0, "maintenance.error_limit must be positive");

        ensure!(
            self.analytics.insights_window_days >= 1,
            "analytics.insights_window_days must be at least 1"
        );
        ensure!(
            self.analytics.max_period_days >= 1,
            "analytics.max_period_days must be at least 1"
        );
        ensure!(
            self.demand.max_horizon_hours >= 1,
            "demand.max_horizon_hours must be at least 1"
        );
        ensure!(
            self.data.history_days >= 1 && self.data.telemetry_days >= 1,
            "data.history_days and data.telemetry_days must be at least 1"
        );
        ensure!(
            self.models.training_window_days >= 1,
            "models.training_window_days must be at least 1"
        );
        Ok(())
    }
}
