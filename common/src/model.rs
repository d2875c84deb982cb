//! Production record types shared by the ETL and analytics crates.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

pub const COL_MACHINE: &str = "maquina";
pub const COL_DATE: &str = "data";
pub const COL_HOURS: &str = "horas_trabalhadas";
pub const COL_FAILURES: &str = "falhas";
pub const COL_PRODUCTION: &str = "producao";
pub const COL_FAILURE_TIME: &str = "horario_falha";

/// Columns every source must provide. `horario_falha` is optional.
pub const REQUIRED_COLUMNS: [&str; 5] = [
    COL_MACHINE,
    COL_DATE,
    COL_HOURS,
    COL_FAILURES,
    COL_PRODUCTION,
];

/// A row after type normalization. Anything that failed to parse is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRecord {
    pub machine_id: String,
    pub date: Option<NaiveDate>,
    pub hours_worked: Option<f64>,
    /// Numeric but not yet cast to an integer.
    pub failure_count: Option<f64>,
    pub production_quantity: Option<f64>,
    pub failure_timestamp: Option<NaiveDateTime>,
}

/// One machine on one day, with every measure present and in range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionRecord {
    pub machine_id: String,
    pub date: NaiveDate,
    pub hours_worked: f64,
    pub failure_count: i64,
    pub production_quantity: f64,
    pub failure_timestamp: Option<NaiveDateTime>,
}

/// Normalized rows plus whether the optional failure-time column was present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    pub records: Vec<RawRecord>,
    pub has_failure_timestamp: bool,
}

impl RecordTable {
    pub fn new(records: Vec<RawRecord>, has_failure_timestamp: bool) -> Self {
        Self {
            records,
            has_failure_timestamp,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
