use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::prelude::{SessionConfig, SessionContext};
use tracing::{info, instrument};

use crate::aggregation::{
    AggregateSpec, AggregationEngine, FailureTotal, GroupKey, MachineProduction,
    PeriodProduction, failure_totals, machine_production, period_production,
};
use crate::cleaning::CleanedDataset;
use crate::forecast::{ForecastEngine, ForecastRecord};

/// Everything the dashboard needs, computed from one filtered dataset.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub dataset: CleanedDataset,
    pub machines_selected: usize,
    pub monthly_table: RecordBatch,
    pub failures_by_machine: Vec<FailureTotal>,
    pub production_by_machine: Vec<MachineProduction>,
    pub daily_production: Vec<PeriodProduction>,
    pub weekly_production: Vec<PeriodProduction>,
    pub monthly_production: Vec<PeriodProduction>,
    pub forecasts: Vec<ForecastRecord>,
}

/// Single-partition context; the datasets are small and processed in one pass.
pub fn session_context() -> SessionContext {
    let config = SessionConfig::new().with_target_partitions(1);
    SessionContext::new_with_config(config)
}

#[instrument(skip(dataset), fields(rows = dataset.len()))]
pub async fn analyze(
    dataset: CleanedDataset,
    machines_selected: usize,
    window: usize,
) -> Result<Analysis> {
    let ctx = session_context();
    let aggregation = AggregationEngine::new(ctx.clone());
    let forecasting = ForecastEngine::new(ctx, window)?;

    let batch = dataset.to_record_batch()?;

    let failures = aggregation
        .aggregate_batch(batch.clone(), &AggregateSpec::failures_per_machine())
        .await?;
    let per_machine = aggregation
        .aggregate_batch(batch.clone(), &AggregateSpec::production_per_machine())
        .await?;
    let daily = aggregation
        .aggregate_batch(
            batch.clone(),
            &AggregateSpec::production_per_period(GroupKey::Date),
        )
        .await?;
    let weekly = aggregation
        .aggregate_batch(
            batch.clone(),
            &AggregateSpec::production_per_period(GroupKey::Week),
        )
        .await?;
    let monthly = aggregation
        .aggregate_batch(batch, &AggregateSpec::monthly_production())
        .await?;

    let forecasts = forecasting.forecast(&monthly).await?;

    let analysis = Analysis {
        failures_by_machine: failure_totals(&failures)?,
        production_by_machine: machine_production(&per_machine)?,
        daily_production: period_production(&daily, GroupKey::Date)?,
        weekly_production: period_production(&weekly, GroupKey::Week)?,
        monthly_production: period_production(&monthly, GroupKey::Month)?,
        monthly_table: monthly,
        forecasts,
        machines_selected,
        dataset,
    };

    info!(
        machines = analysis.failures_by_machine.len(),
        months = analysis.monthly_production.len(),
        forecasts = analysis.forecasts.len(),
        "Analysis finished"
    );
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaning::clean;
    use chrono::NaiveDate;
    use common::model::{RawRecord, RecordTable};
    use etl::rules::CleaningRules;

    fn raw(machine: &str, month: u32, production: f64) -> RawRecord {
        RawRecord {
            machine_id: machine.to_string(),
            date: NaiveDate::from_ymd_opt(2024, month, 10),
            hours_worked: Some(8.0),
            failure_count: Some(1.0),
            production_quantity: Some(production),
            failure_timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_analyze_produces_every_table() {
        let table = RecordTable::new(
            vec![
                raw("A1", 1, 10.0),
                raw("A1", 2, 20.0),
                raw("A1", 3, 30.0),
                raw("B1", 3, 50.0),
            ],
            false,
        );
        let dataset = clean(&table, &CleaningRules::default());
        let analysis = analyze(dataset, 2, 3).await.unwrap();

        assert_eq!(analysis.failures_by_machine[0].machine_id, "A1");
        assert_eq!(analysis.failures_by_machine[0].total_failures, 3);
        assert_eq!(analysis.daily_production.len(), 4);
        assert_eq!(analysis.weekly_production.len(), 4);
        assert_eq!(analysis.monthly_production.len(), 4);
        assert_eq!(analysis.monthly_table.num_rows(), 4);
        assert_eq!(analysis.forecasts.len(), 2);
        assert_eq!(analysis.forecasts[0].predicted_production, 20.0);
        assert_eq!(analysis.forecasts[1].forecast_month, "2024-04");
    }

    #[tokio::test]
    async fn test_analyze_empty_dataset() {
        let analysis = analyze(CleanedDataset::default(), 0, 3).await.unwrap();
        assert!(analysis.failures_by_machine.is_empty());
        assert!(analysis.monthly_production.is_empty());
        assert!(analysis.forecasts.is_empty());
    }
}
