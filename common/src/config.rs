use chrono::NaiveDate;
use config::{Config, ConfigError};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

use crate::{Error, Result};

/// Read when no `-c` path is given; may be absent.
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_source_csv")]
    pub source_csv: PathBuf,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CleaningConfig {
    /// Imputed for missing `horas_trabalhadas` (one standard shift).
    #[serde(default = "default_hours_worked")]
    pub default_hours_worked: f64,
    #[serde(default = "default_max_hours_worked")]
    pub max_hours_worked: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForecastConfig {
    #[serde(default = "default_forecast_window")]
    pub window: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_machines")]
    pub machines: Vec<String>,
    #[serde(default = "default_regular_failure_machines")]
    pub regular_failure_machines: Vec<String>,
    #[serde(default = "default_days")]
    pub days: u32,
    /// Last generated day; today when unset.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_shift_start_hour")]
    pub shift_start_hour: u32,
    #[serde(default = "default_shift_hours")]
    pub shift_hours: f64,
    #[serde(default = "default_rate_mean")]
    pub rate_mean: f64,
    #[serde(default = "default_rate_std")]
    pub rate_std: f64,
    #[serde(default = "default_noise_std")]
    pub noise_std: f64,
    #[serde(default = "default_failure_probability")]
    pub failure_probability: f64,
    #[serde(default = "default_regular_failure_probability")]
    pub regular_failure_probability: f64,
    #[serde(default = "default_missing_production_ratio")]
    pub missing_production_ratio: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    /// Selected machines; empty selects all of them.
    #[serde(default)]
    pub machines: Vec<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_source_csv() -> PathBuf {
    PathBuf::from("data/raw/producao_raw.csv")
}

fn default_database() -> PathBuf {
    PathBuf::from("data/processed/producao.db")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_table() -> String {
    "producao_maquinas".to_string()
}

fn default_hours_worked() -> f64 {
    10.0
}

fn default_max_hours_worked() -> f64 {
    24.0
}

fn default_forecast_window() -> usize {
    3
}

fn default_machines() -> Vec<String> {
    (1..=5)
        .map(|n| format!("A{n}"))
        .chain((1..=3).map(|n| format!("B{n}")))
        .collect()
}

fn default_regular_failure_machines() -> Vec<String> {
    vec!["A3".to_string(), "B2".to_string()]
}

fn default_days() -> u32 {
    180
}

fn default_seed() -> u64 {
    42
}

fn default_shift_start_hour() -> u32 {
    8
}

fn default_shift_hours() -> f64 {
    10.0
}

fn default_rate_mean() -> f64 {
    7.5
}

fn default_rate_std() -> f64 {
    1.2
}

fn default_noise_std() -> f64 {
    0.8
}

fn default_failure_probability() -> f64 {
    0.03
}

fn default_regular_failure_probability() -> f64 {
    0.10
}

fn default_missing_production_ratio() -> f64 {
    0.01
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_csv: default_source_csv(),
            database: default_database(),
            reports_dir: default_reports_dir(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
        }
    }
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            default_hours_worked: default_hours_worked(),
            max_hours_worked: default_max_hours_worked(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            window: default_forecast_window(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            machines: default_machines(),
            regular_failure_machines: default_regular_failure_machines(),
            days: default_days(),
            end_date: None,
            seed: default_seed(),
            shift_start_hour: default_shift_start_hour(),
            shift_hours: default_shift_hours(),
            rate_mean: default_rate_mean(),
            rate_std: default_rate_std(),
            noise_std: default_noise_std(),
            failure_probability: default_failure_probability(),
            regular_failure_probability: default_regular_failure_probability(),
            missing_production_ratio: default_missing_production_ratio(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Settings {
    /// A `required` file that does not exist is an error; otherwise the
    /// defaults and environment apply.
    pub fn new(path: &str, required: bool) -> std::result::Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path).required(required))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let config = builder.build()?;

        let settings: Settings = config.try_deserialize()?;

        debug!(
            database = %settings.paths.database.display(),
            table = %settings.store.table,
            "Parsed pipeline settings"
        );

        Ok(settings)
    }

    /// Loads and validates in one step. An explicit path must exist; without
    /// one, [`DEFAULT_CONFIG_PATH`] is read if present.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::new(path, true)?,
            None => Self::new(DEFAULT_CONFIG_PATH, false)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.forecast.window == 0 {
            return Err(Error::InvalidInput(
                "forecast.window must be at least 1".to_string(),
            ));
        }

        let table = &self.store.table;
        let valid_table = !table.is_empty()
            && !table.starts_with(|c: char| c.is_ascii_digit())
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_table {
            return Err(Error::InvalidInput(format!(
                "store.table '{}' is not a plain SQL identifier",
                table
            )));
        }

        let max_hours = self.cleaning.max_hours_worked;
        if !(max_hours > 0.0 && max_hours <= 24.0) {
            return Err(Error::InvalidInput(format!(
                "cleaning.max_hours_worked must be in (0, 24], got {}",
                max_hours
            )));
        }

        let default_hours = self.cleaning.default_hours_worked;
        if !(default_hours.is_finite() && default_hours >= 0.0) {
            return Err(Error::InvalidInput(format!(
                "cleaning.default_hours_worked must be a non-negative number, got {}",
                default_hours
            )));
        }

        if let (Some(from), Some(to)) = (self.dashboard.from, self.dashboard.to) {
            if from > to {
                return Err(Error::InvalidInput(format!(
                    "dashboard.from ({}) is after dashboard.to ({})",
                    from, to
                )));
            }
        }

        Ok(())
    }
}
