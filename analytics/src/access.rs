use std::path::{Path, PathBuf};

use common::Result;
use common::config::Settings;
use common::model::RecordTable;
use common::store::ProductionStore;
use tracing::{info, instrument};

/// Read side of the production store.
pub struct DataAccess {
    database: PathBuf,
    table: String,
}

impl DataAccess {
    pub fn new(database: &Path, table: &str) -> Self {
        Self {
            database: database.to_path_buf(),
            table: table.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.paths.database, &settings.store.table)
    }

    /// Reads the whole relation. The store is opened and closed within the call.
    #[instrument(skip(self), fields(path = %self.database.display(), table = %self.table))]
    pub fn read_table(&self) -> Result<RecordTable> {
        let store = ProductionStore::open_existing(&self.database, &self.table)?;
        let table = store.read_all()?;
        info!(rows = table.len(), "Read production table");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::Error;
    use common::model::ProductionRecord;
    use tempfile::tempdir;

    #[test]
    fn test_reads_back_persisted_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("producao.db");
        let mut store = ProductionStore::open(&path, "producao_maquinas").unwrap();
        store
            .replace_all(
                &[ProductionRecord {
                    machine_id: "A1".to_string(),
                    date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                    hours_worked: 10.0,
                    failure_count: 1,
                    production_quantity: 70.5,
                    failure_timestamp: None,
                }],
                false,
            )
            .unwrap();
        drop(store);

        let table = DataAccess::new(&path, "producao_maquinas")
            .read_table()
            .unwrap();
        assert_eq!(table.len(), 1);
        assert!(!table.has_failure_timestamp);
        assert_eq!(table.records[0].production_quantity, Some(70.5));
    }

    #[test]
    fn test_missing_store_is_store_access() {
        let dir = tempdir().unwrap();
        let result = DataAccess::new(&dir.path().join("absent.db"), "producao_maquinas")
            .read_table();
        assert!(matches!(result, Err(Error::StoreAccess(_))));
    }
}
