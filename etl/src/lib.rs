pub mod generator;
pub mod loader;
pub mod rules;
pub mod source;

use std::path::PathBuf;

use common::Result;
use common::config::Settings;
use common::store::ProductionStore;
use tracing::info;

use generator::DataGenerator;
use loader::EtlLoader;
use rules::CleaningRules;
use source::{CsvSource, RecordSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtlSummary {
    pub rows_read: usize,
    pub rows_written: usize,
    pub dropped_invalid_dates: usize,
}

/// Runs the ETL stage against the configured CSV file.
pub fn run_etl_pipeline(settings: &Settings) -> Result<EtlSummary> {
    let source = CsvSource::new(&settings.paths.source_csv);
    run_etl(&source, settings)
}

/// Reads and validates everything before the store is opened, so a missing
/// source or a bad header leaves the previous table untouched.
pub fn run_etl(source: &dyn RecordSource, settings: &Settings) -> Result<EtlSummary> {
    info!(source = %source.describe(), "Starting ETL");
    let raw = source.read()?;

    let loader = EtlLoader::new(CleaningRules::from_config(&settings.cleaning));
    let loaded = loader.load(&raw)?;

    let mut store = ProductionStore::open(&settings.paths.database, &settings.store.table)?;
    let rows_written = loader.persist(&loaded, &mut store)?;

    info!(rows_written, "ETL finished successfully");
    Ok(EtlSummary {
        rows_read: loaded.rows_read,
        rows_written,
        dropped_invalid_dates: loaded.sanitized.dropped_invalid_dates,
    })
}

/// Writes the synthetic dataset to the configured source CSV path.
pub fn generate_source_csv(settings: &Settings) -> Result<PathBuf> {
    let generator = DataGenerator::new(settings.generator.clone());
    let table = generator.generate()?;
    let path = settings.paths.source_csv.clone();
    table.write_csv(&path)?;
    info!(
        path = %path.display(),
        rows = table.len(),
        end_date = %generator.end_date(),
        "Dataset generated"
    );
    Ok(path)
}
