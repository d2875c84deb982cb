//! SQLite-backed production store.
//!
//! The store holds exactly one relation. Writers replace it wholesale inside
//! a single transaction; readers get every row back as a [`RecordTable`].

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, instrument};

use crate::model::{
    COL_DATE, COL_FAILURE_TIME, COL_FAILURES, COL_HOURS, COL_MACHINE, COL_PRODUCTION,
    ProductionRecord, REQUIRED_COLUMNS, RawRecord, RecordTable,
};
use crate::parse::{format_date, format_timestamp, parse_date, parse_number, parse_timestamp};
use crate::{Error, Result};

pub struct ProductionStore {
    conn: Connection,
    path: PathBuf,
    table: String,
}

impl ProductionStore {
    /// Opens (creating if needed) the database file for writing.
    pub fn open(path: &Path, table: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::StoreAccess(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::StoreAccess(format!("cannot open {}: {}", path.display(), e)))?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            table: table.to_string(),
        })
    }

    /// Opens an existing database read-only. A missing file is a store error.
    pub fn open_existing(path: &Path, table: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| Error::StoreAccess(format!("cannot open {}: {}", path.display(), e)))?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            table: table.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Drops and recreates the relation, then inserts every record.
    #[instrument(skip(self, records), fields(table = %self.table, rows = records.len()))]
    pub fn replace_all(
        &mut self,
        records: &[ProductionRecord],
        with_failure_timestamp: bool,
    ) -> Result<usize> {
        let table = self.table.clone();
        let tx = self.conn.transaction()?;

        let failure_time_column = if with_failure_timestamp {
            format!(", {} TEXT", COL_FAILURE_TIME)
        } else {
            String::new()
        };
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS \"{table}\";
             CREATE TABLE \"{table}\" (
                {COL_MACHINE} TEXT NOT NULL,
                {COL_DATE} TEXT NOT NULL,
                {COL_HOURS} REAL NOT NULL,
                {COL_FAILURES} INTEGER NOT NULL,
                {COL_PRODUCTION} REAL NOT NULL{failure_time_column}
             );"
        ))?;

        {
            if with_failure_timestamp {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO \"{table}\" ({COL_MACHINE}, {COL_DATE}, {COL_HOURS}, {COL_FAILURES}, {COL_PRODUCTION}, {COL_FAILURE_TIME}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ))?;
                for record in records {
                    stmt.execute(params![
                        record.machine_id,
                        format_date(record.date),
                        record.hours_worked,
                        record.failure_count,
                        record.production_quantity,
                        record.failure_timestamp.map(format_timestamp),
                    ])?;
                }
            } else {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO \"{table}\" ({COL_MACHINE}, {COL_DATE}, {COL_HOURS}, {COL_FAILURES}, {COL_PRODUCTION}) VALUES (?1, ?2, ?3, ?4, ?5)"
                ))?;
                for record in records {
                    stmt.execute(params![
                        record.machine_id,
                        format_date(record.date),
                        record.hours_worked,
                        record.failure_count,
                        record.production_quantity,
                    ])?;
                }
            }
        }

        tx.commit()?;
        info!(path = %self.path.display(), rows = records.len(), "Replaced production table");
        Ok(records.len())
    }

    fn columns(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1)")?;
        let names = stmt
            .query_map(params![self.table], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names.into_iter().map(|n| n.to_lowercase()).collect())
    }

    /// Reads the whole relation. Values that do not coerce are `None`.
    #[instrument(skip(self), fields(table = %self.table))]
    pub fn read_all(&self) -> Result<RecordTable> {
        let columns = self.columns()?;
        if columns.is_empty() {
            return Err(Error::StoreAccess(format!(
                "table '{}' not found in {}; run the ETL first",
                self.table,
                self.path.display()
            )));
        }

        let missing: Vec<String> = REQUIRED_COLUMNS
            .into_iter()
            .filter(|c| !columns.iter().any(|have| have.as_str() == *c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Schema(missing));
        }

        let has_failure_timestamp = columns.iter().any(|c| c == COL_FAILURE_TIME);
        let failure_time = if has_failure_timestamp {
            COL_FAILURE_TIME
        } else {
            "NULL"
        };

        let sql = format!(
            "SELECT {COL_MACHINE}, {COL_DATE}, {COL_HOURS}, {COL_FAILURES}, {COL_PRODUCTION}, {failure_time} FROM \"{}\"",
            self.table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], |row| {
                Ok(RawRecord {
                    machine_id: value_as_text(row.get::<_, Value>(0)?).unwrap_or_default(),
                    date: value_as_text(row.get::<_, Value>(1)?).and_then(|v| parse_date(&v)),
                    hours_worked: value_as_number(row.get::<_, Value>(2)?),
                    failure_count: value_as_number(row.get::<_, Value>(3)?),
                    production_quantity: value_as_number(row.get::<_, Value>(4)?),
                    failure_timestamp: value_as_text(row.get::<_, Value>(5)?)
                        .and_then(|v| parse_timestamp(&v)),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(rows = records.len(), has_failure_timestamp, "Read production table");
        Ok(RecordTable::new(records, has_failure_timestamp))
    }
}

fn value_as_text(value: Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

fn value_as_number(value: Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(i as f64),
        Value::Real(f) if f.is_finite() => Some(f),
        Value::Text(text) => parse_number(&text),
        _ => None,
    }
}
