//! Record sources: anything that yields a rectangular table of raw cells.

use std::path::{Path, PathBuf};

use common::{Error, Result};
use tracing::info;

/// Untyped rows as read from a source. Headers are trimmed and lower-cased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new<H, S>(headers: H) -> Self
    where
        H: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|h| h.as_ref().trim().to_lowercase())
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<R, S>(&mut self, row: R)
    where
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    /// Cell by row and column; short rows read as empty.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

pub trait RecordSource {
    fn describe(&self) -> String;

    fn read(&self) -> Result<RawTable>;
}

pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for CsvSource {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn read(&self) -> Result<RawTable> {
        if !self.path.is_file() {
            return Err(Error::SourceNotFound(self.path.display().to_string()));
        }

        info!(path = %self.path.display(), "Reading CSV");
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let mut table = RawTable::new(reader.headers()?.iter());
        for record in reader.records() {
            let record = record?;
            table.push_row(record.iter());
        }

        info!(rows = table.len(), "Rows read");
        Ok(table)
    }
}

/// A table already in memory; used by tests and the generator.
impl RecordSource for RawTable {
    fn describe(&self) -> String {
        format!("memory:{} rows", self.len())
    }

    fn read(&self) -> Result<RawTable> {
        Ok(self.clone())
    }
}
