//! Grouped summaries over the cleaned dataset, executed as DataFusion SQL.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use common::Result;
use common::model::{COL_DATE, COL_FAILURES, COL_HOURS, COL_MACHINE, COL_PRODUCTION};
use common::parse::format_date;
use datafusion::prelude::SessionContext;
use serde::Serialize;
use tracing::debug;

use crate::cleaning::CleanedDataset;
use crate::schema::{COL_FAILURE_RATE, COL_MONTH, COL_WEEK};
use crate::utils::arrow::{date_column, f64_column, i64_column, single_batch, string_column};

const SOURCE_TABLE: &str = "producao_limpa";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Machine,
    Date,
    Week,
    Month,
}

impl GroupKey {
    pub fn column(&self) -> &'static str {
        match self {
            GroupKey::Machine => COL_MACHINE,
            GroupKey::Date => COL_DATE,
            GroupKey::Week => COL_WEEK,
            GroupKey::Month => COL_MONTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    FailureCount,
    ProductionQuantity,
    HoursWorked,
    FailureRate,
}

impl Metric {
    pub fn column(&self) -> &'static str {
        match self {
            Metric::FailureCount => COL_FAILURES,
            Metric::ProductionQuantity => COL_PRODUCTION,
            Metric::HoursWorked => COL_HOURS,
            Metric::FailureRate => COL_FAILURE_RATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Sum,
    Mean,
    Min,
    Max,
    Count,
}

impl AggOp {
    fn sql_function(&self) -> &'static str {
        match self {
            AggOp::Sum => "SUM",
            AggOp::Mean => "AVG",
            AggOp::Min => "MIN",
            AggOp::Max => "MAX",
            AggOp::Count => "COUNT",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            AggOp::Sum => "sum",
            AggOp::Mean => "mean",
            AggOp::Min => "min",
            AggOp::Max => "max",
            AggOp::Count => "count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending by the group keys, in the order they were given.
    ByKeys,
    /// Measure descending, ties broken by the keys ascending.
    ByValueDesc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSpec {
    pub keys: Vec<GroupKey>,
    pub metric: Metric,
    pub op: AggOp,
    pub order: SortOrder,
}

impl AggregateSpec {
    pub fn new(keys: Vec<GroupKey>, metric: Metric, op: AggOp, order: SortOrder) -> Self {
        Self {
            keys,
            metric,
            op,
            order,
        }
    }

    pub fn failures_per_machine() -> Self {
        Self::new(
            vec![GroupKey::Machine],
            Metric::FailureCount,
            AggOp::Sum,
            SortOrder::ByValueDesc,
        )
    }

    pub fn production_per_machine() -> Self {
        Self::new(
            vec![GroupKey::Machine],
            Metric::ProductionQuantity,
            AggOp::Mean,
            SortOrder::ByKeys,
        )
    }

    pub fn production_per_period(period: GroupKey) -> Self {
        Self::new(
            vec![period, GroupKey::Machine],
            Metric::ProductionQuantity,
            AggOp::Mean,
            SortOrder::ByKeys,
        )
    }

    pub fn monthly_production() -> Self {
        Self::production_per_period(GroupKey::Month)
    }

    /// Name of the output measure column, e.g. `sum_falhas`.
    pub fn measure_name(&self) -> String {
        format!("{}_{}", self.op.prefix(), self.metric.column())
    }

    fn to_sql(&self, table: &str) -> String {
        let keys: Vec<String> = self
            .keys
            .iter()
            .map(|k| format!("\"{}\"", k.column()))
            .collect();
        let measure = self.measure_name();
        let select = format!(
            "{}(\"{}\") AS \"{}\"",
            self.op.sql_function(),
            self.metric.column(),
            measure
        );

        if keys.is_empty() {
            return format!("SELECT {} FROM \"{}\"", select, table);
        }

        let key_list = keys.join(", ");
        let order = match self.order {
            SortOrder::ByKeys => keys
                .iter()
                .map(|k| format!("{} ASC", k))
                .collect::<Vec<_>>()
                .join(", "),
            SortOrder::ByValueDesc => std::iter::once(format!("\"{}\" DESC", measure))
                .chain(keys.iter().map(|k| format!("{} ASC", k)))
                .collect::<Vec<_>>()
                .join(", "),
        };

        format!(
            "SELECT {key_list}, {select} FROM \"{table}\" GROUP BY {key_list} ORDER BY {order}"
        )
    }
}

pub struct AggregationEngine {
    ctx: SessionContext,
}

impl AggregationEngine {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    pub async fn aggregate(
        &self,
        dataset: &CleanedDataset,
        spec: &AggregateSpec,
    ) -> Result<RecordBatch> {
        let batch = dataset.to_record_batch()?;
        self.aggregate_batch(batch, spec).await
    }

    /// Runs `spec` over a batch shaped like the cleaned schema.
    pub async fn aggregate_batch(
        &self,
        batch: RecordBatch,
        spec: &AggregateSpec,
    ) -> Result<RecordBatch> {
        let sql = spec.to_sql(SOURCE_TABLE);
        debug!(%sql, rows = batch.num_rows(), "Running aggregation");

        self.ctx.register_batch(SOURCE_TABLE, batch)?;
        let result = self.execute_sql(&sql).await;
        self.ctx.deregister_table(SOURCE_TABLE)?;
        result
    }

    async fn execute_sql(&self, sql: &str) -> Result<RecordBatch> {
        let df = self.ctx.sql(sql).await?;
        let schema: SchemaRef = Arc::new(df.schema().as_arrow().clone());
        let batches = df.collect().await?;
        single_batch(schema, &batches)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureTotal {
    pub machine_id: String,
    pub total_failures: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineProduction {
    pub machine_id: String,
    pub mean_production: f64,
}

/// Mean production of one machine in one period (day, week or month).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodProduction {
    pub period: String,
    pub machine_id: String,
    pub mean_production: f64,
}

pub fn failure_totals(table: &RecordBatch) -> Result<Vec<FailureTotal>> {
    let spec = AggregateSpec::failures_per_machine();
    let machines = string_column(table, COL_MACHINE)?;
    let totals = i64_column(table, &spec.measure_name())?;
    Ok(machines
        .into_iter()
        .zip(totals)
        .filter_map(|(machine, total)| {
            Some(FailureTotal {
                machine_id: machine?,
                total_failures: total?,
            })
        })
        .collect())
}

pub fn machine_production(table: &RecordBatch) -> Result<Vec<MachineProduction>> {
    let spec = AggregateSpec::production_per_machine();
    let machines = string_column(table, COL_MACHINE)?;
    let means = f64_column(table, &spec.measure_name())?;
    Ok(machines
        .into_iter()
        .zip(means)
        .filter_map(|(machine, mean)| {
            Some(MachineProduction {
                machine_id: machine?,
                mean_production: mean?,
            })
        })
        .collect())
}

pub fn period_production(table: &RecordBatch, period: GroupKey) -> Result<Vec<PeriodProduction>> {
    let spec = AggregateSpec::production_per_period(period);
    let periods: Vec<Option<String>> = match period {
        GroupKey::Month | GroupKey::Machine => string_column(table, period.column())?,
        GroupKey::Date | GroupKey::Week => date_column(table, period.column())?
            .into_iter()
            .map(|d| d.map(format_date))
            .collect(),
    };
    let machines = string_column(table, COL_MACHINE)?;
    let means = f64_column(table, &spec.measure_name())?;

    Ok(periods
        .into_iter()
        .zip(machines)
        .zip(means)
        .filter_map(|((period, machine), mean)| {
            Some(PeriodProduction {
                period: period?,
                machine_id: machine?,
                mean_production: mean?,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaning::clean;
    use chrono::NaiveDate;
    use common::model::{RawRecord, RecordTable};
    use etl::rules::CleaningRules;

    fn raw(machine: &str, y: i32, m: u32, d: u32, failures: f64, production: f64) -> RawRecord {
        RawRecord {
            machine_id: machine.to_string(),
            date: NaiveDate::from_ymd_opt(y, m, d),
            hours_worked: Some(10.0),
            failure_count: Some(failures),
            production_quantity: Some(production),
            failure_timestamp: None,
        }
    }

    fn dataset() -> CleanedDataset {
        let table = RecordTable::new(
            vec![
                raw("B1", 2024, 1, 1, 2.0, 10.0),
                raw("A1", 2024, 1, 1, 1.0, 20.0),
                raw("A1", 2024, 1, 2, 1.0, 40.0),
                raw("C1", 2024, 2, 5, 2.0, 60.0),
                raw("A1", 2024, 2, 5, 0.0, 80.0),
            ],
            false,
        );
        clean(&table, &CleaningRules::default())
    }

    fn engine() -> AggregationEngine {
        AggregationEngine::new(SessionContext::new())
    }

    #[test]
    fn test_sql_orders_by_value_then_machine() {
        let sql = AggregateSpec::failures_per_machine().to_sql("t");
        assert_eq!(
            sql,
            "SELECT \"maquina\", SUM(\"falhas\") AS \"sum_falhas\" FROM \"t\" GROUP BY \"maquina\" ORDER BY \"sum_falhas\" DESC, \"maquina\" ASC"
        );
    }

    #[tokio::test]
    async fn test_total_failures_descending_with_ties_by_machine() {
        let engine = engine();
        let table = engine
            .aggregate(&dataset(), &AggregateSpec::failures_per_machine())
            .await
            .unwrap();
        let totals = failure_totals(&table).unwrap();
        let order: Vec<(&str, i64)> = totals
            .iter()
            .map(|t| (t.machine_id.as_str(), t.total_failures))
            .collect();
        assert_eq!(order, vec![("A1", 2), ("B1", 2), ("C1", 2)]);
    }

    #[tokio::test]
    async fn test_mean_production_per_machine() {
        let engine = engine();
        let table = engine
            .aggregate(&dataset(), &AggregateSpec::production_per_machine())
            .await
            .unwrap();
        let means = machine_production(&table).unwrap();
        assert_eq!(
            means,
            vec![
                MachineProduction {
                    machine_id: "A1".to_string(),
                    mean_production: 140.0 / 3.0
                },
                MachineProduction {
                    machine_id: "B1".to_string(),
                    mean_production: 10.0
                },
                MachineProduction {
                    machine_id: "C1".to_string(),
                    mean_production: 60.0
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_monthly_production_by_month_then_machine() {
        let engine = engine();
        let table = engine
            .aggregate(&dataset(), &AggregateSpec::monthly_production())
            .await
            .unwrap();
        let monthly = period_production(&table, GroupKey::Month).unwrap();
        let rows: Vec<(&str, &str, f64)> = monthly
            .iter()
            .map(|p| (p.period.as_str(), p.machine_id.as_str(), p.mean_production))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("2024-01", "A1", 30.0),
                ("2024-01", "B1", 10.0),
                ("2024-02", "A1", 80.0),
                ("2024-02", "C1", 60.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_weekly_buckets_start_on_monday() {
        let engine = engine();
        let table = engine
            .aggregate(&dataset(), &AggregateSpec::production_per_period(GroupKey::Week))
            .await
            .unwrap();
        let weekly = period_production(&table, GroupKey::Week).unwrap();
        assert_eq!(weekly[0].period, "2024-01-01");
        assert_eq!(weekly[0].machine_id, "A1");
        assert_eq!(weekly[0].mean_production, 30.0);
        assert_eq!(weekly.last().unwrap().period, "2024-02-05");
    }

    #[tokio::test]
    async fn test_aggregate_empty_is_empty() {
        let engine = engine();
        for spec in [
            AggregateSpec::failures_per_machine(),
            AggregateSpec::production_per_machine(),
            AggregateSpec::monthly_production(),
        ] {
            let table = engine
                .aggregate(&CleanedDataset::default(), &spec)
                .await
                .unwrap();
            assert_eq!(table.num_rows(), 0);
        }
        let table = engine
            .aggregate(&CleanedDataset::default(), &AggregateSpec::failures_per_machine())
            .await
            .unwrap();
        assert!(failure_totals(&table).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_max_failure_rate_per_machine() {
        let engine = engine();
        let spec = AggregateSpec::new(
            vec![GroupKey::Machine],
            Metric::FailureRate,
            AggOp::Max,
            SortOrder::ByKeys,
        );
        let table = engine.aggregate(&dataset(), &spec).await.unwrap();
        assert_eq!(spec.measure_name(), "max_falhas_por_hora");
        let rates = f64_column(&table, "max_falhas_por_hora").unwrap();
        assert_eq!(rates, vec![Some(0.1), Some(0.2), Some(0.2)]);
    }
}
