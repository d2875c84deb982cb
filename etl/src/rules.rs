//! Row sanitation applied before persisting and again after every read.
//!
//! The rules run in a fixed order, each assuming the previous ones ran:
//!
//! 1. drop rows whose date did not parse (and count them)
//! 2. keep the failure timestamp only when it parsed
//! 3. missing hours become the configured shift length, then clamp to `[0, max]`
//! 4. missing failure counts become 0, truncate to an integer, clamp at 0
//! 5. missing production becomes the mean of the retained rows, then clamp at 0
//!
//! The mean in rule 5 is global across machines, not per machine.

use common::config::CleaningConfig;
use common::model::{ProductionRecord, RawRecord};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct CleaningRules {
    pub default_hours_worked: f64,
    pub max_hours_worked: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sanitized {
    pub records: Vec<ProductionRecord>,
    pub dropped_invalid_dates: usize,
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self::from_config(&CleaningConfig::default())
    }
}

impl CleaningRules {
    pub fn from_config(config: &CleaningConfig) -> Self {
        Self {
            default_hours_worked: config.default_hours_worked,
            max_hours_worked: config.max_hours_worked,
        }
    }

    pub fn apply(&self, rows: &[RawRecord]) -> Sanitized {
        if rows.is_empty() {
            debug!("Empty input, skipping sanitation");
            return Sanitized::default();
        }

        let retained: Vec<&RawRecord> = rows.iter().filter(|r| r.date.is_some()).collect();
        let dropped_invalid_dates = rows.len() - retained.len();
        info!(dropped = dropped_invalid_dates, "Removed records with invalid date");

        let production_fill = mean(retained.iter().filter_map(|r| r.production_quantity))
            .unwrap_or(0.0);

        let records = retained
            .into_iter()
            .filter_map(|row| {
                let date = row.date?;
                Some(ProductionRecord {
                    machine_id: row.machine_id.clone(),
                    date,
                    hours_worked: row
                        .hours_worked
                        .unwrap_or(self.default_hours_worked)
                        .clamp(0.0, self.max_hours_worked),
                    failure_count: (row.failure_count.unwrap_or(0.0).trunc() as i64).max(0),
                    production_quantity: row
                        .production_quantity
                        .unwrap_or(production_fill)
                        .max(0.0),
                    failure_timestamp: row.failure_timestamp,
                })
            })
            .collect();

        Sanitized {
            records,
            dropped_invalid_dates,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(machine: &str, day: Option<u32>) -> RawRecord {
        RawRecord {
            machine_id: machine.to_string(),
            date: day.and_then(|d| NaiveDate::from_ymd_opt(2024, 1, d)),
            hours_worked: Some(10.0),
            failure_count: Some(0.0),
            production_quantity: Some(50.0),
            failure_timestamp: None,
        }
    }

    #[test]
    fn test_empty_input_is_empty_output() {
        assert_eq!(CleaningRules::default().apply(&[]), Sanitized::default());
    }

    #[test]
    fn test_invalid_dates_are_dropped_and_counted() {
        let rows = vec![raw("A1", Some(1)), raw("A1", None), raw("A2", None)];
        let out = CleaningRules::default().apply(&rows);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.dropped_invalid_dates, 2);
        assert_eq!(rows.len() - out.records.len(), out.dropped_invalid_dates);
    }

    #[test]
    fn test_all_invalid_dates_yield_nothing() {
        let rows = vec![raw("A1", None), raw("A2", None)];
        let out = CleaningRules::default().apply(&rows);
        assert!(out.records.is_empty());
        assert_eq!(out.dropped_invalid_dates, 2);
    }

    #[test]
    fn test_hours_imputed_then_clamped() {
        let mut missing = raw("A1", Some(1));
        missing.hours_worked = None;
        let mut high = raw("A1", Some(2));
        high.hours_worked = Some(30.0);
        let mut negative = raw("A1", Some(3));
        negative.hours_worked = Some(-2.0);

        let out = CleaningRules::default().apply(&[missing, high, negative]);
        let hours: Vec<f64> = out.records.iter().map(|r| r.hours_worked).collect();
        assert_eq!(hours, vec![10.0, 24.0, 0.0]);
    }

    #[test]
    fn test_failures_imputed_truncated_clamped() {
        let mut missing = raw("A1", Some(1));
        missing.failure_count = None;
        let mut fractional = raw("A1", Some(2));
        fractional.failure_count = Some(2.7);
        let mut negative = raw("A1", Some(3));
        negative.failure_count = Some(-4.0);

        let out = CleaningRules::default().apply(&[missing, fractional, negative]);
        let failures: Vec<i64> = out.records.iter().map(|r| r.failure_count).collect();
        assert_eq!(failures, vec![0, 2, 0]);
    }

    #[test]
    fn test_production_uses_global_mean_of_retained_rows() {
        let mut a = raw("A1", Some(1));
        a.production_quantity = Some(10.0);
        let mut b = raw("B1", Some(1));
        b.production_quantity = Some(30.0);
        let mut gap = raw("A1", Some(2));
        gap.production_quantity = None;
        // Dropped by rule 1, so its value must not enter the mean.
        let mut dropped = raw("B1", None);
        dropped.production_quantity = Some(1000.0);
        let mut negative = raw("B1", Some(3));
        negative.production_quantity = Some(-40.0);

        let out = CleaningRules::default().apply(&[a, b, gap, dropped, negative]);
        let production: Vec<f64> = out.records.iter().map(|r| r.production_quantity).collect();
        // mean of 10, 30, -40 is 0; the negative value itself clamps to 0
        assert_eq!(production, vec![10.0, 30.0, 0.0, 0.0]);
    }

    #[test]
    fn test_production_all_missing_imputes_zero() {
        let mut only = raw("A1", Some(1));
        only.production_quantity = None;
        let out = CleaningRules::default().apply(&[only]);
        assert_eq!(out.records[0].production_quantity, 0.0);
    }

    #[test]
    fn test_custom_hours_from_config() {
        let rules = CleaningRules::from_config(&CleaningConfig {
            default_hours_worked: 8.0,
            max_hours_worked: 12.0,
        });
        let mut missing = raw("A1", Some(1));
        missing.hours_worked = None;
        let mut high = raw("A1", Some(2));
        high.hours_worked = Some(16.0);
        let out = rules.apply(&[missing, high]);
        assert_eq!(out.records[0].hours_worked, 8.0);
        assert_eq!(out.records[1].hours_worked, 12.0);
    }
}
