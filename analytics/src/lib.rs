pub mod access;
pub mod aggregation;
pub mod analysis;
pub mod cleaning;
pub mod dashboard;
pub mod forecast;
pub mod report;
pub mod schema;
pub mod utils;

use common::Result;
use common::config::Settings;
use etl::rules::CleaningRules;
use tracing::{info, warn};

use access::DataAccess;
use analysis::analyze;
use cleaning::{DatasetFilter, clean};
use dashboard::{DashboardView, render};
use forecast::forecast_batch;
use report::{ReportFiles, ReportWriter};

#[derive(Debug, Clone)]
pub struct AnalyticsOutput {
    pub view: DashboardView,
    pub files: ReportFiles,
}

/// Reads the store, cleans and filters the rows, aggregates and forecasts,
/// then writes the report files.
pub async fn run_analytics_pipeline(settings: &Settings) -> Result<AnalyticsOutput> {
    let table = DataAccess::from_settings(settings).read_table()?;
    let cleaned = clean(&table, &CleaningRules::from_config(&settings.cleaning));

    let filter = DatasetFilter::from(&settings.dashboard);
    let dataset = cleaned.filter(&filter);
    if dataset.is_empty() && !cleaned.is_empty() {
        warn!(
            machines = ?filter.machines,
            from = ?filter.from,
            to = ?filter.to,
            "Dashboard filter selects no rows"
        );
    }

    let machines_selected = if filter.machines.is_empty() {
        dataset.machines().len()
    } else {
        filter.machines.len()
    };

    let analysis = analyze(dataset, machines_selected, settings.forecast.window).await?;
    let view = render(&analysis);
    let forecast = forecast_batch(&analysis.forecasts)?;

    let files = ReportWriter::new(&settings.paths.reports_dir).write(
        &view,
        &analysis.monthly_table,
        &forecast,
    )?;

    match &view {
        DashboardView::Empty { message } => info!(%message, "Report written without data"),
        DashboardView::Ready(dashboard) => info!(
            machines = dashboard.cards.machines_selected,
            days = dashboard.cards.days_in_range,
            forecasts = dashboard.forecast.len(),
            "Report written"
        ),
    }
    Ok(AnalyticsOutput { view, files })
}
