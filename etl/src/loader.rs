use common::model::{
    COL_DATE, COL_FAILURE_TIME, COL_FAILURES, COL_HOURS, COL_MACHINE, COL_PRODUCTION,
    REQUIRED_COLUMNS, RawRecord, RecordTable,
};
use common::parse::{parse_date, parse_number, parse_timestamp};
use common::store::ProductionStore;
use common::{Error, Result};
use tracing::{info, instrument};

use crate::rules::{CleaningRules, Sanitized};
use crate::source::RawTable;

/// Column positions of a validated raw table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnMap {
    pub machine: usize,
    pub date: usize,
    pub hours: usize,
    pub failures: usize,
    pub production: usize,
    pub failure_time: Option<usize>,
}

impl ColumnMap {
    /// Fails with every missing required column, not just the first.
    pub fn resolve(table: &RawTable) -> Result<Self> {
        let find = |name: &str| {
            let name = name.to_lowercase();
            table.headers.iter().position(|h| h.trim().to_lowercase() == name)
        };

        let missing: Vec<String> = REQUIRED_COLUMNS
            .into_iter()
            .filter(|c| find(*c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Schema(missing));
        }

        let required = |name: &str| find(name).ok_or_else(|| Error::Schema(vec![name.to_string()]));
        Ok(Self {
            machine: required(COL_MACHINE)?,
            date: required(COL_DATE)?,
            hours: required(COL_HOURS)?,
            failures: required(COL_FAILURES)?,
            production: required(COL_PRODUCTION)?,
            failure_time: find(COL_FAILURE_TIME),
        })
    }
}

pub struct EtlLoader {
    rules: CleaningRules,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedRecords {
    pub sanitized: Sanitized,
    pub rows_read: usize,
    pub has_failure_timestamp: bool,
}

impl EtlLoader {
    pub fn new(rules: CleaningRules) -> Self {
        Self { rules }
    }

    /// Validates columns and coerces every cell; bad cells become missing.
    pub fn normalize(&self, table: &RawTable) -> Result<RecordTable> {
        let columns = ColumnMap::resolve(table)?;

        let records = (0..table.len())
            .map(|row| RawRecord {
                machine_id: table.cell(row, columns.machine).trim().to_string(),
                date: parse_date(table.cell(row, columns.date)),
                hours_worked: parse_number(table.cell(row, columns.hours)),
                failure_count: parse_number(table.cell(row, columns.failures)),
                production_quantity: parse_number(table.cell(row, columns.production)),
                failure_timestamp: columns
                    .failure_time
                    .and_then(|col| parse_timestamp(table.cell(row, col))),
            })
            .collect();

        Ok(RecordTable::new(records, columns.failure_time.is_some()))
    }

    #[instrument(skip(self, table), fields(rows = table.len()))]
    pub fn load(&self, table: &RawTable) -> Result<LoadedRecords> {
        let normalized = self.normalize(table)?;
        let sanitized = self.rules.apply(&normalized.records);
        info!(
            rows_read = normalized.len(),
            rows_kept = sanitized.records.len(),
            dropped = sanitized.dropped_invalid_dates,
            "Records validated"
        );

        Ok(LoadedRecords {
            rows_read: normalized.len(),
            has_failure_timestamp: normalized.has_failure_timestamp,
            sanitized,
        })
    }

    pub fn persist(&self, loaded: &LoadedRecords, store: &mut ProductionStore) -> Result<usize> {
        info!(path = %store.path().display(), table = store.table(), "Writing to SQLite");
        store.replace_all(&loaded.sanitized.records, loaded.has_failure_timestamp)
    }
}
