//! Cleaning and derived columns.
//!
//! [`clean`] runs the sanitation rules shared with the ETL loader and then
//! derives the failure rate and the week/month buckets. It never fails: bad
//! cells were already coerced to missing when the table was read.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, Date32Array, Float64Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, Duration, NaiveDate};
use common::Result;
use common::config::DashboardConfig;
use common::model::{ProductionRecord, RecordTable};
use etl::rules::CleaningRules;
use tracing::{debug, info};

use crate::schema::{TableSchema, get_schema};
use crate::utils::arrow::date_to_days;

#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    pub record: ProductionRecord,
    pub failure_rate_per_hour: f64,
    pub week_bucket: NaiveDate,
    pub month_bucket: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedDataset {
    pub records: Vec<CleanedRecord>,
    pub dropped_invalid_dates: usize,
}

/// Machine and inclusive date-range selection applied before presentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetFilter {
    pub machines: Vec<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl From<&DashboardConfig> for DatasetFilter {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            machines: config.machines.clone(),
            from: config.from,
            to: config.to,
        }
    }
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn month_bucket(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Zero-hour days divide by one instead of zero.
pub fn failure_rate(failure_count: i64, hours_worked: f64) -> f64 {
    let hours = if hours_worked == 0.0 { 1.0 } else { hours_worked };
    failure_count as f64 / hours
}

pub fn clean(table: &RecordTable, rules: &CleaningRules) -> CleanedDataset {
    if table.is_empty() {
        debug!("Empty table, skipping cleaning");
        return CleanedDataset::default();
    }

    let sanitized = rules.apply(&table.records);
    let records = sanitized
        .records
        .into_iter()
        .map(|record| CleanedRecord {
            failure_rate_per_hour: failure_rate(record.failure_count, record.hours_worked),
            week_bucket: week_start(record.date),
            month_bucket: month_bucket(record.date),
            record,
        })
        .collect::<Vec<_>>();

    info!(
        rows = records.len(),
        dropped = sanitized.dropped_invalid_dates,
        "Cleaning finished"
    );
    CleanedDataset {
        records,
        dropped_invalid_dates: sanitized.dropped_invalid_dates,
    }
}

impl CleanedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct machine ids, ascending.
    pub fn machines(&self) -> Vec<String> {
        let mut machines: Vec<String> = self
            .records
            .iter()
            .map(|r| r.record.machine_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        machines.sort();
        machines
    }

    pub fn filter(&self, filter: &DatasetFilter) -> CleanedDataset {
        let selected: HashSet<&str> = filter.machines.iter().map(String::as_str).collect();
        let records = self
            .records
            .iter()
            .filter(|r| selected.is_empty() || selected.contains(r.record.machine_id.as_str()))
            .filter(|r| filter.from.is_none_or(|from| r.record.date >= from))
            .filter(|r| filter.to.is_none_or(|to| r.record.date <= to))
            .cloned()
            .collect();

        CleanedDataset {
            records,
            dropped_invalid_dates: self.dropped_invalid_dates,
        }
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let rows = &self.records;
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.record.machine_id.as_str()),
            )),
            Arc::new(Date32Array::from_iter_values(
                rows.iter().map(|r| date_to_days(r.record.date)),
            )),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.record.hours_worked),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.record.failure_count),
            )),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.record.production_quantity),
            )),
            Arc::new(TimestampMillisecondArray::from(
                rows.iter()
                    .map(|r| {
                        r.record
                            .failure_timestamp
                            .map(|ts| ts.and_utc().timestamp_millis())
                    })
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.failure_rate_per_hour),
            )),
            Arc::new(Date32Array::from_iter_values(
                rows.iter().map(|r| date_to_days(r.week_bucket)),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.month_bucket.as_str()),
            )),
        ];

        Ok(RecordBatch::try_new(get_schema(TableSchema::Cleaned), columns)?)
    }
}
