use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use chrono::Utc;
use common::{Error, Result};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use tracing::{debug, info};

use crate::dashboard::DashboardView;

pub const DASHBOARD_FILE: &str = "dashboard.json";
pub const MONTHLY_FILE: &str = "producao_mensal.parquet";
pub const FORECAST_FILE: &str = "previsao.parquet";

/// Paths of everything a report run wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFiles {
    pub dashboard: PathBuf,
    pub monthly: Option<PathBuf>,
    pub forecast: Option<PathBuf>,
}

pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Writes the dashboard document, and the monthly and forecast tables
    /// when there is data. Tables left over from an earlier run are removed
    /// when the view is empty.
    pub fn write(
        &self,
        view: &DashboardView,
        monthly: &RecordBatch,
        forecast: &RecordBatch,
    ) -> Result<ReportFiles> {
        std::fs::create_dir_all(&self.dir)?;

        let dashboard = self.dir.join(DASHBOARD_FILE);
        std::fs::write(&dashboard, serde_json::to_vec_pretty(view)?)?;
        info!(path = %dashboard.display(), "Dashboard written");

        let mut files = ReportFiles {
            dashboard,
            ..ReportFiles::default()
        };

        if view.is_empty() {
            remove_stale(&self.dir.join(MONTHLY_FILE))?;
            remove_stale(&self.dir.join(FORECAST_FILE))?;
            return Ok(files);
        }

        let monthly_path = self.dir.join(MONTHLY_FILE);
        write_parquet(&monthly_path, monthly, "monthly_production")?;
        files.monthly = Some(monthly_path);

        let forecast_path = self.dir.join(FORECAST_FILE);
        write_parquet(&forecast_path, forecast, "forecast")?;
        files.forecast = Some(forecast_path);

        Ok(files)
    }
}

fn writer_properties(table: &str) -> WriterProperties {
    WriterProperties::builder()
        .set_key_value_metadata(Some(vec![
            KeyValue::new("table".to_string(), table.to_string()),
            KeyValue::new("generated_at".to_string(), Utc::now().to_rfc3339()),
        ]))
        .build()
}

pub fn write_parquet(path: &Path, batch: &RecordBatch, table: &str) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties(table)))?;
    writer.write(batch)?;
    writer.close()?;
    info!(path = %path.display(), rows = batch.num_rows(), "Parquet table written");
    Ok(())
}

fn remove_stale(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale report table");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::EMPTY_DATASET_MESSAGE;
    use crate::forecast::{ForecastRecord, forecast_batch};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::tempdir;

    fn forecast() -> RecordBatch {
        forecast_batch(&[ForecastRecord {
            machine_id: "A1".to_string(),
            forecast_month: "2024-04".to_string(),
            predicted_production: 20.0,
        }])
        .unwrap()
    }

    #[test]
    fn test_parquet_round_trip_keeps_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(FORECAST_FILE);
        write_parquet(&path, &forecast(), "forecast").unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_empty_view_writes_only_the_dashboard() {
        let dir = tempdir().unwrap();
        let reports = dir.path().join("reports");
        std::fs::create_dir_all(&reports).unwrap();
        std::fs::write(reports.join(MONTHLY_FILE), b"stale").unwrap();

        let view = DashboardView::Empty {
            message: EMPTY_DATASET_MESSAGE.to_string(),
        };
        let files = ReportWriter::new(&reports)
            .write(&view, &forecast(), &forecast())
            .unwrap();

        assert!(files.monthly.is_none());
        assert!(!reports.join(MONTHLY_FILE).exists());
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&files.dashboard).unwrap()).unwrap();
        assert_eq!(json["status"], "empty");
        assert_eq!(json["message"], EMPTY_DATASET_MESSAGE);
    }
}
