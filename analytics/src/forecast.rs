//! Naive one-month-ahead forecast: the last trailing moving average of each
//! machine's monthly mean production.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use chrono::{Months, NaiveDate};
use common::model::COL_MACHINE;
use common::{Error, Result};
use datafusion::prelude::SessionContext;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregation::AggregateSpec;
use crate::schema::{COL_MONTH, TableSchema, get_schema};
use crate::utils::arrow::{f64_column, single_batch, string_column};

const MONTHLY_TABLE: &str = "producao_mensal";
pub const COL_MOVING_AVERAGE: &str = "media_movel";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    pub machine_id: String,
    pub forecast_month: String,
    pub predicted_production: f64,
}

/// Month label after `label`, both `YYYY-MM`.
pub fn next_month(label: &str) -> Option<String> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", label), "%Y-%m-%d").ok()?;
    let next = first.checked_add_months(Months::new(1))?;
    Some(next.format("%Y-%m").to_string())
}

pub struct ForecastEngine {
    ctx: SessionContext,
    window: usize,
}

impl ForecastEngine {
    pub fn new(ctx: SessionContext, window: usize) -> Result<Self> {
        if window == 0 {
            return Err(Error::InvalidInput(
                "forecast window must be at least 1".to_string(),
            ));
        }
        Ok(Self { ctx, window })
    }

    fn frame(&self) -> String {
        match self.window {
            1 => "ROWS BETWEEN CURRENT ROW AND CURRENT ROW".to_string(),
            w => format!("ROWS BETWEEN {} PRECEDING AND CURRENT ROW", w - 1),
        }
    }

    /// Adds the trailing moving average to a monthly aggregate, ordered by
    /// machine then month. Partial windows at the start of a series count.
    pub async fn moving_average(&self, monthly: &RecordBatch) -> Result<RecordBatch> {
        let measure = AggregateSpec::monthly_production().measure_name();
        let sql = format!(
            "SELECT \"{machine}\", \"{month}\", \"{measure}\", \
             AVG(\"{measure}\") OVER (PARTITION BY \"{machine}\" ORDER BY \"{month}\" {frame}) \
             AS \"{COL_MOVING_AVERAGE}\" \
             FROM \"{MONTHLY_TABLE}\" ORDER BY \"{machine}\" ASC, \"{month}\" ASC",
            machine = COL_MACHINE,
            month = COL_MONTH,
            frame = self.frame(),
        );
        debug!(%sql, window = self.window, "Computing moving average");

        self.ctx.register_batch(MONTHLY_TABLE, monthly.clone())?;
        let result = self.execute_sql(&sql).await;
        self.ctx.deregister_table(MONTHLY_TABLE)?;
        result
    }

    pub async fn forecast(&self, monthly: &RecordBatch) -> Result<Vec<ForecastRecord>> {
        if monthly.num_rows() == 0 {
            debug!("No monthly history, nothing to forecast");
            return Ok(Vec::new());
        }

        let averaged = self.moving_average(monthly).await?;
        let machines = string_column(&averaged, COL_MACHINE)?;
        let months = string_column(&averaged, COL_MONTH)?;
        let averages = f64_column(&averaged, COL_MOVING_AVERAGE)?;

        // rows are sorted by machine then month, so the last row of a run wins
        let mut forecasts: Vec<ForecastRecord> = Vec::new();
        let rows = machines.into_iter().zip(months).zip(averages);
        for ((machine, month), average) in rows {
            let (Some(machine), Some(month), Some(average)) = (machine, month, average) else {
                continue;
            };
            let Some(forecast_month) = next_month(&month) else {
                warn!(machine = %machine, month = %month, "Unparseable month bucket");
                continue;
            };
            let record = ForecastRecord {
                machine_id: machine,
                forecast_month,
                predicted_production: average,
            };
            match forecasts.last_mut() {
                Some(last) if last.machine_id == record.machine_id => *last = record,
                _ => forecasts.push(record),
            }
        }

        info!(machines = forecasts.len(), window = self.window, "Forecast computed");
        Ok(forecasts)
    }

    async fn execute_sql(&self, sql: &str) -> Result<RecordBatch> {
        let df = self.ctx.sql(sql).await?;
        let schema: SchemaRef = Arc::new(df.schema().as_arrow().clone());
        let batches = df.collect().await?;
        single_batch(schema, &batches)
    }
}

pub fn forecast_batch(records: &[ForecastRecord]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.machine_id.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.forecast_month.as_str()),
        )),
        Arc::new(Float64Array::from_iter_values(
            records.iter().map(|r| r.predicted_production),
        )),
    ];
    Ok(RecordBatch::try_new(
        get_schema(TableSchema::Forecast),
        columns,
    )?)
}
