//! Synthetic production data, used as a fixture for the rest of the pipeline.

use std::collections::HashSet;

use chrono::{Duration, Local, NaiveDate};
use common::config::GeneratorConfig;
use common::model::{
    COL_DATE, COL_FAILURE_TIME, COL_FAILURES, COL_HOURS, COL_MACHINE, COL_PRODUCTION,
};
use common::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::source::{RawTable, RecordSource};

pub struct DataGenerator {
    config: GeneratorConfig,
    end_date: NaiveDate,
}

impl DataGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let end_date = config
            .end_date
            .unwrap_or_else(|| Local::now().date_naive());
        Self { config, end_date }
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn generate(&self) -> Result<RawTable> {
        let cfg = &self.config;
        if cfg.machines.is_empty() {
            return Err(Error::InvalidInput(
                "generator.machines must not be empty".to_string(),
            ));
        }

        for (name, probability) in [
            ("failure_probability", cfg.failure_probability),
            ("regular_failure_probability", cfg.regular_failure_probability),
            ("missing_production_ratio", cfg.missing_production_ratio),
        ] {
            if !(0.0..=1.0).contains(&probability) {
                return Err(Error::InvalidInput(format!(
                    "generator.{} must be within [0, 1], got {}",
                    name, probability
                )));
            }
        }

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let regular: HashSet<&str> = cfg
            .regular_failure_machines
            .iter()
            .map(String::as_str)
            .collect();
        let shift_seconds = (cfg.shift_hours * 3600.0).max(0.0);

        let mut table = RawTable::new([
            COL_MACHINE,
            COL_DATE,
            COL_HOURS,
            COL_FAILURES,
            COL_PRODUCTION,
            COL_FAILURE_TIME,
        ]);

        let first_day = self
            .end_date
            .checked_sub_signed(Duration::days(i64::from(cfg.days.saturating_sub(1))))
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "generator.days = {} reaches before the earliest representable date",
                    cfg.days
                ))
            })?;
        for offset in 0..cfg.days {
            let day = first_day + Duration::days(i64::from(offset));
            let shift_start = day
                .and_hms_opt(cfg.shift_start_hour.min(23), 0, 0)
                .ok_or_else(|| Error::InvalidInput("invalid shift start hour".to_string()))?;

            for machine in &cfg.machines {
                let rate = normal(&mut rng, cfg.rate_mean, cfg.rate_std);
                let noise = normal(&mut rng, 0.0, cfg.noise_std);
                let production = (cfg.shift_hours * (rate + noise).max(0.0)).max(0.0);

                let probability = if regular.contains(machine.as_str()) {
                    cfg.regular_failure_probability
                } else {
                    cfg.failure_probability
                };
                let failed = rng.random_bool(probability);

                let failure_time = if failed {
                    let offset = rng.random::<f64>() * shift_seconds;
                    let at = shift_start + Duration::seconds(offset as i64);
                    at.format("%Y-%m-%dT%H:%M").to_string()
                } else {
                    String::new()
                };

                let production = if rng.random_bool(cfg.missing_production_ratio) {
                    String::new()
                } else {
                    format!("{:.2}", production)
                };

                table.push_row([
                    machine.clone(),
                    day.format("%Y-%m-%d").to_string(),
                    format!("{}", cfg.shift_hours),
                    (if failed { "1" } else { "0" }).to_string(),
                    production,
                    failure_time,
                ]);
            }
        }

        info!(
            rows = table.len(),
            machines = cfg.machines.len(),
            regular_failures = ?cfg.regular_failure_machines,
            "Generated synthetic dataset"
        );
        Ok(table)
    }
}

impl RecordSource for DataGenerator {
    fn describe(&self) -> String {
        format!("generator:seed={}", self.config.seed)
    }

    fn read(&self) -> Result<RawTable> {
        self.generate()
    }
}

/// Box-Muller transform over the uniform generator.
fn normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}
